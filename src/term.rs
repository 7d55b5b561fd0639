use std::fmt::Debug;

use crate::{
    error::{Error, Result},
    grad::Gradients,
    op::{CustomFn, Op},
    tape::{finite_literal, NodeId, NodeKind, Tape},
};

/// A handle to a node recorded on a [`Tape`].
///
/// Every operator computes its value eagerly and appends one record to the
/// tape. A term never changes after creation.
#[derive(Copy, Clone)]
pub struct TapeTerm<'a> {
    pub(crate) tape: &'a Tape,
    pub(crate) idx: u32,
}

/// An operand of a binary operator: either a tracked term or a raw literal
/// that gets lifted into a constant node.
#[derive(Copy, Clone, Debug)]
pub enum Operand<'a> {
    Term(TapeTerm<'a>),
    Literal(f64),
}

impl<'a> From<TapeTerm<'a>> for Operand<'a> {
    fn from(term: TapeTerm<'a>) -> Self {
        Self::Term(term)
    }
}

impl<'a> From<f64> for Operand<'a> {
    fn from(value: f64) -> Self {
        Self::Literal(value)
    }
}

impl<'a> From<f32> for Operand<'a> {
    fn from(value: f32) -> Self {
        Self::Literal(value.into())
    }
}

impl<'a> From<i32> for Operand<'a> {
    fn from(value: i32) -> Self {
        Self::Literal(value.into())
    }
}

impl<'a> Operand<'a> {
    fn value(&self) -> f64 {
        match self {
            Self::Term(term) => term.value(),
            Self::Literal(value) => *value,
        }
    }
}

impl<'a> Debug for TapeTerm<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.tape.nodes.borrow();
        let node = &nodes[self.idx as usize];
        f.debug_struct("TapeTerm")
            .field("id", &self.id())
            .field("name", &node.name)
            .field("value", &node.data)
            .finish()
    }
}

impl<'a> TapeTerm<'a> {
    pub fn id(&self) -> NodeId {
        self.tape.node_id(self.idx)
    }

    pub fn name(&self) -> String {
        self.tape.nodes.borrow()[self.idx as usize].name.clone()
    }

    /// The value computed in the forward pass.
    pub fn value(&self) -> f64 {
        self.tape.nodes.borrow()[self.idx as usize].data
    }

    /// Whether this term is a lifted literal.
    pub fn is_constant(&self) -> bool {
        self.tape.nodes.borrow()[self.idx as usize].kind == NodeKind::Constant
    }

    pub fn tape(&self) -> &'a Tape {
        self.tape
    }

    /// Check the operand without touching the tape, so that a rejected
    /// operation leaves no trace.
    fn validate(&self, rhs: Operand<'a>) -> Result<Operand<'a>> {
        match rhs {
            Operand::Term(term) => self.tape.check(&term).map(|_| rhs),
            Operand::Literal(value) => finite_literal(value).map(|_| rhs),
        }
    }

    fn lift(&self, rhs: Operand<'a>) -> TapeTerm<'a> {
        match rhs {
            Operand::Term(term) => term,
            Operand::Literal(value) => self.tape.push_constant(value),
        }
    }

    fn binary(
        self,
        rhs: impl Into<Operand<'a>>,
        symbol: &str,
        f: impl FnOnce(f64, f64) -> Result<(Op, f64)>,
    ) -> Result<Self> {
        let rhs = self.validate(rhs.into())?;
        let (op, data) = f(self.value(), rhs.value())?;
        let rhs = self.lift(rhs);
        Ok(self.tape.append(op, vec![self.idx, rhs.idx], data, || {
            format!("({} {symbol} {})", self.name(), rhs.name())
        }))
    }

    fn unary(self, op: Op, data: f64) -> Self {
        let name = op.name().to_string();
        self.tape
            .append(op, vec![self.idx], data, || format!("{name}({})", self.name()))
    }

    pub fn try_add(self, rhs: impl Into<Operand<'a>>) -> Result<Self> {
        self.binary(rhs, "+", |lhs, rhs| Ok((Op::Add, lhs + rhs)))
    }

    pub fn try_sub(self, rhs: impl Into<Operand<'a>>) -> Result<Self> {
        self.binary(rhs, "-", |lhs, rhs| Ok((Op::Sub, lhs - rhs)))
    }

    pub fn try_mul(self, rhs: impl Into<Operand<'a>>) -> Result<Self> {
        self.binary(rhs, "*", |lhs, rhs| Ok((Op::Mul { lhs, rhs }, lhs * rhs)))
    }

    /// Division. Dividing by zero is a domain error.
    pub fn try_div(self, rhs: impl Into<Operand<'a>>) -> Result<Self> {
        self.binary(rhs, "/", |lhs, rhs| {
            if rhs == 0. {
                return Err(Error::domain("div", rhs));
            }
            Ok((Op::Div { lhs, rhs }, lhs / rhs))
        })
    }

    pub fn sin(self) -> Self {
        let x = self.value();
        self.unary(Op::Sin { x }, x.sin())
    }

    pub fn cos(self) -> Self {
        let x = self.value();
        self.unary(Op::Cos { x }, x.cos())
    }

    pub fn exp(self) -> Self {
        let y = self.value().exp();
        self.unary(Op::Exp { y }, y)
    }

    /// Natural logarithm. Fails with [`Error::Domain`] unless the value is
    /// strictly positive.
    pub fn ln(self) -> Result<Self> {
        let x = self.value();
        if x.is_nan() || x <= 0. {
            return Err(Error::domain("ln", x));
        }
        Ok(self.unary(Op::Ln { x }, x.ln()))
    }

    /// Apply a custom unary function `f` whose derivative is `grad`.
    /// A non-finite forward result is a domain error.
    pub fn apply(
        self,
        name: &(impl AsRef<str> + ?Sized),
        f: fn(f64) -> f64,
        grad: fn(f64) -> f64,
    ) -> Result<Self> {
        let x = self.value();
        let data = f(x);
        if !data.is_finite() {
            return Err(Error::domain(name.as_ref(), x));
        }
        let op = Op::Custom(CustomFn {
            name: name.as_ref().to_string(),
            grad,
            x,
        });
        Ok(self.unary(op, data))
    }

    /// The entry point to backpropagation. Equivalent to `tape.grad(self)`.
    pub fn backprop(&self) -> Result<Gradients> {
        self.tape.grad(*self)
    }

    /// One-time derivation of this term with respect to `var`.
    pub fn derive(&self, var: &Self) -> Result<f64> {
        self.backprop()?.wrt(var)
    }
}

impl<'a> std::ops::Neg for TapeTerm<'a> {
    type Output = Self;
    fn neg(self) -> Self::Output {
        let data = -self.value();
        self.unary(Op::Neg, data)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $try_method:ident, $($lit:ty),*) => {
        /// # Panics
        ///
        /// Panics if `rhs` belongs to another session, is a non-finite literal,
        /// or is out of the operator's domain. Use the `try_` method to get an
        /// [`Error`] instead.
        impl<'a, R: Into<Operand<'a>>> std::ops::$trait<R> for TapeTerm<'a> {
            type Output = Self;
            fn $method(self, rhs: R) -> Self::Output {
                self.$try_method(rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }

        $(
            impl<'a> std::ops::$trait<TapeTerm<'a>> for $lit {
                type Output = TapeTerm<'a>;
                fn $method(self, rhs: TapeTerm<'a>) -> Self::Output {
                    let lhs = rhs
                        .validate(Operand::from(self))
                        .map(|lhs| rhs.lift(lhs))
                        .and_then(|lhs| lhs.$try_method(rhs));
                    lhs.unwrap_or_else(|e| panic!("{e}"))
                }
            }
        )*
    };
}

impl_binary_op!(Add, add, try_add, f64, f32, i32);
impl_binary_op!(Sub, sub, try_sub, f64, f32, i32);
impl_binary_op!(Mul, mul, try_mul, f64, f32, i32);
impl_binary_op!(Div, div, try_div, f64, f32, i32);

#[test]
fn test_forward() {
    let tape = Tape::new();
    let a = tape.term("a", 3.);
    let b = tape.term("b", 4.);
    assert_eq!((a + b).value(), 7.);
    assert_eq!((a - b).value(), -1.);
    assert_eq!((a * b).value(), 12.);
    assert_eq!((a / b).value(), 0.75);
    assert_eq!((-a).value(), -3.);
    assert_eq!(a.sin().value(), 3f64.sin());
    assert_eq!(a.cos().value(), 3f64.cos());
    assert_eq!(a.exp().value(), 3f64.exp());
    assert_eq!(a.ln().unwrap().value(), 3f64.ln());
    assert_eq!(tape.len(), 9);
}

#[test]
fn test_literal_lifting() {
    let tape = Tape::new();
    let a = tape.term("a", 3.);
    let b = a * 2.;
    let c = 1 - a;
    let d = a + 0.5f32;
    assert_eq!(b.value(), 6.);
    assert_eq!(c.value(), -2.);
    assert_eq!(d.value(), 3.5);
    let records = tape.records();
    let lifted = records[1].inputs()[0];
    assert!(TapeTerm {
        tape: &tape,
        idx: lifted
    }
    .is_constant());
    assert!(!a.is_constant());
}

#[test]
fn test_domain_leaves_no_record() {
    let tape = Tape::new();
    let a = tape.term("a", 0.);
    assert!(matches!(a.ln(), Err(Error::Domain { .. })));
    assert!(matches!(a.try_div(0.), Err(Error::Domain { .. })));
    assert!(matches!(
        a.apply("inv", |x| 1. / x, |x| -1. / (x * x)),
        Err(Error::Domain { .. })
    ));
    assert!(matches!(
        a.try_add(f64::NAN),
        Err(Error::NonFiniteLiteral(v)) if v.is_nan()
    ));
    assert_eq!(tape.len(), 0);
    assert_eq!(tape.node_count(), 1);
}

#[test]
fn test_apply() {
    let tape = Tape::new();
    let a = tape.term("a", 2.);
    let sq = a.apply("sq", |x| x * x, |x| 2. * x).unwrap();
    assert_eq!(sq.value(), 4.);
    assert_eq!(sq.derive(&a).unwrap(), 4.);
}

#[cfg(feature = "expr_name")]
#[test]
fn test_expr_names() {
    let tape = Tape::new();
    let x = tape.term("x", 1.);
    let y = tape.term("y", 2.);
    assert_eq!((x + y).sin().name(), "sin((x + y))");
    assert_eq!((x * 2.).name(), "(x * 2)");
    assert_eq!(x.name(), "x");
}

#[cfg(not(feature = "expr_name"))]
#[test]
fn test_index_names() {
    let tape = Tape::new();
    let x = tape.term("x", 1.);
    let y = tape.term("y", 2.);
    assert_eq!((x + y).sin().name(), "a3");
    assert_eq!((x * 2.).name(), "a5");
    assert_eq!(x.name(), "x");
}
