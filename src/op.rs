//! Backward rules of the recorded operations.

/// A custom unary function applied by [`crate::TapeTerm::apply`].
#[derive(Clone, Debug)]
pub struct CustomFn {
    pub name: String,
    pub grad: fn(f64) -> f64,
    pub x: f64,
}

/// Compared by name and operand, since function pointers have no stable
/// identity.
impl PartialEq for CustomFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.x == other.x
    }
}

/// The kind of a recorded operation, carrying exactly the forward values
/// needed to compute its local derivatives.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul { lhs: f64, rhs: f64 },
    Div { lhs: f64, rhs: f64 },
    Neg,
    Sin { x: f64 },
    Cos { x: f64 },
    Ln { x: f64 },
    /// `y` is the forward result, which is also the derivative.
    Exp { y: f64 },
    Custom(CustomFn),
}

impl Op {
    pub fn name(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul { .. } => "mul",
            Self::Div { .. } => "div",
            Self::Neg => "neg",
            Self::Sin { .. } => "sin",
            Self::Cos { .. } => "cos",
            Self::Ln { .. } => "ln",
            Self::Exp { .. } => "exp",
            Self::Custom(CustomFn { name, .. }) => name.as_str(),
        }
    }

    /// Number of inputs this operation consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Add | Self::Sub | Self::Mul { .. } | Self::Div { .. } => 2,
            _ => 1,
        }
    }

    /// Map the gradients with respect to the outputs into the gradients with
    /// respect to each input, in input order.
    ///
    /// Every operation has a single output. A missing output gradient means
    /// nothing downstream consumed it, so it contributes zero.
    pub fn propagate(&self, output_grads: &[f64]) -> Vec<f64> {
        use Op::*;
        let dl = output_grads.first().copied().unwrap_or(0.);
        match self {
            Add => vec![dl, dl],
            Sub => vec![dl, -dl],
            Mul { lhs, rhs } => vec![dl * rhs, dl * lhs],
            Div { lhs, rhs } => vec![dl / rhs, -dl * lhs / (rhs * rhs)],
            Neg => vec![-dl],
            Sin { x } => vec![dl * x.cos()],
            Cos { x } => vec![-dl * x.sin()],
            Ln { x } => vec![dl * (1. / x)],
            Exp { y } => vec![dl * y],
            Custom(CustomFn { grad, x, .. }) => vec![dl * grad(*x)],
        }
    }
}

#[test]
fn test_propagate() {
    assert_eq!(Op::Add.propagate(&[3.]), vec![3., 3.]);
    assert_eq!(Op::Sub.propagate(&[3.]), vec![3., -3.]);
    assert_eq!(
        Op::Mul { lhs: 2., rhs: 5. }.propagate(&[3.]),
        vec![15., 6.]
    );
    assert_eq!(
        Op::Div { lhs: 1., rhs: 2. }.propagate(&[1.]),
        vec![0.5, -0.25]
    );
    assert_eq!(Op::Neg.propagate(&[3.]), vec![-3.]);
    assert_eq!(Op::Sin { x: 0. }.propagate(&[2.]), vec![2.]);
    assert_eq!(Op::Cos { x: 0. }.propagate(&[2.]), vec![-0.]);
    assert_eq!(Op::Ln { x: 4. }.propagate(&[2.]), vec![0.5]);
    assert_eq!(Op::Exp { y: 3. }.propagate(&[2.]), vec![6.]);
}

#[test]
fn test_propagate_unconsumed() {
    assert_eq!(Op::Mul { lhs: 2., rhs: 5. }.propagate(&[]), vec![0., 0.]);
    assert_eq!(Op::Ln { x: 4. }.propagate(&[0.]), vec![0.]);
}

#[test]
fn test_arity() {
    assert_eq!(Op::Sub.arity(), 2);
    assert_eq!(Op::Sin { x: 1. }.arity(), 1);
    let custom = Op::Custom(CustomFn {
        name: "sq".into(),
        grad: |x| 2. * x,
        x: 3.,
    });
    assert_eq!(custom.arity(), 1);
    assert_eq!(custom.name(), "sq");
    assert_eq!(custom.propagate(&[1.]), vec![6.]);
}
