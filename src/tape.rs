//! Implementation of shared memory arena for the terms, aka a tape.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! A [`Tape`] is one differentiation session. It owns the arena of nodes and
//! the append-only log of [`Record`]s. Records are appended in forward
//! execution order, so walking the log backwards is a valid reverse
//! topological order for backpropagation.

use std::{
    cell::RefCell,
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, trace};

use crate::{
    dot::DotBuilder,
    error::{Error, Result},
    grad::{backprop, Gradients},
    op::Op,
    term::TapeTerm,
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

fn next_session() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

/// A literal can only be lifted if it is finite.
pub(crate) fn finite_literal(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NonFiniteLiteral(value))
    }
}

/// The identity of a node. Unique across sessions, so identities from before
/// a [`Tape::reset`] never collide with the ones after it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    session: u64,
    index: u32,
}

impl NodeId {
    pub(crate) fn new(session: u64, index: u32) -> Self {
        Self { session, index }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// The position of the node in its session's arena.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}:a{}", self.session, self.index)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Variable,
    Constant,
    Derived,
}

#[derive(Clone, Debug)]
pub(crate) struct TapeNode {
    pub name: String,
    pub data: f64,
    pub kind: NodeKind,
}

/// One forward operator application.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub(crate) inputs: Vec<u32>,
    pub(crate) outputs: Vec<u32>,
    pub(crate) op: Op,
}

impl Record {
    /// Arena indices of the operands, in operand order.
    pub fn inputs(&self) -> &[u32] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[u32] {
        &self.outputs
    }

    pub fn op(&self) -> &Op {
        &self.op
    }
}

#[derive(Debug)]
pub struct Tape {
    session: u64,
    pub(crate) nodes: RefCell<Vec<TapeNode>>,
    pub(crate) records: RefCell<Vec<Record>>,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    pub fn new() -> Self {
        Self {
            session: next_session(),
            nodes: RefCell::new(vec![]),
            records: RefCell::new(vec![]),
        }
    }

    /// The serial number of the current session. Changes on every [`Tape::reset`].
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Create a named variable. It does not append a record.
    pub fn term<'a>(&'a self, name: impl Into<String>, init: f64) -> TapeTerm<'a> {
        let idx = self.push_node(name.into(), init, NodeKind::Variable);
        TapeTerm { tape: self, idx }
    }

    /// Lift a literal into a constant node with no history. The gradient
    /// engine never accumulates into constants. A non-finite value is
    /// rejected with [`Error::NonFiniteLiteral`].
    pub fn constant<'a>(&'a self, value: f64) -> Result<TapeTerm<'a>> {
        let value = finite_literal(value)?;
        Ok(self.push_constant(value))
    }

    /// Push a constant whose value already passed [`finite_literal`].
    pub(crate) fn push_constant<'a>(&'a self, value: f64) -> TapeTerm<'a> {
        let idx = self.push_node(format!("{value}"), value, NodeKind::Constant);
        TapeTerm { tape: self, idx }
    }

    fn push_node(&self, name: String, data: f64, kind: NodeKind) -> u32 {
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len() as u32;
        nodes.push(TapeNode { name, data, kind });
        idx
    }

    /// Append the result node and its record. The result is appended before
    /// it is handed out, which keeps the log causally ordered.
    pub(crate) fn append<'a>(
        &'a self,
        op: Op,
        inputs: Vec<u32>,
        data: f64,
        expr: impl FnOnce() -> String,
    ) -> TapeTerm<'a> {
        let idx = self.nodes.borrow().len();
        let name = if cfg!(feature = "expr_name") {
            expr()
        } else {
            format!("a{idx}")
        };
        let idx = self.push_node(name, data, NodeKind::Derived);
        trace!("record {} {:?} -> a{idx} = {data}", op.name(), inputs);
        self.records.borrow_mut().push(Record {
            inputs,
            outputs: vec![idx],
            op,
        });
        TapeTerm { tape: self, idx }
    }

    /// Number of records in the log. Creating variables or constants does not
    /// append records, so this can be 0 while [`Tape::is_empty`] is false.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether the session has not created any node yet. This counts nodes,
    /// not records: a tape holding only variables has [`Tape::len`] 0 but is
    /// not empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// A snapshot of the log, in append order.
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    /// Clear the log and start a new session. Taking `&mut self` guarantees
    /// no term of the old session outlives it.
    pub fn reset(&mut self) {
        let old = self.session;
        self.nodes.get_mut().clear();
        self.records.get_mut().clear();
        self.session = next_session();
        debug!("reset tape: session {old} -> {}", self.session);
    }

    pub(crate) fn check(&self, term: &TapeTerm) -> Result<()> {
        let found = term.tape.session;
        if found == self.session {
            Ok(())
        } else {
            Err(Error::foreign(self.session, found))
        }
    }

    pub(crate) fn node_id(&self, idx: u32) -> NodeId {
        NodeId::new(self.session, idx)
    }

    /// Run backpropagation from `terminal` over the whole log.
    pub fn grad(&self, terminal: TapeTerm) -> Result<Gradients> {
        self.check(&terminal)?;
        Ok(backprop(self, terminal.idx))
    }

    /// Gradients of `terminal` with respect to `vars`, in the order of `vars`.
    /// Variables that did not contribute get 0.
    pub fn grad_wrt(&self, terminal: TapeTerm, vars: &[TapeTerm]) -> Result<Vec<f64>> {
        let grads = self.grad(terminal)?;
        vars.iter().map(|var| grads.wrt(var)).collect()
    }

    pub fn dot_builder(&self) -> DotBuilder<'_> {
        DotBuilder::new(self)
    }
}

#[test]
fn test_lifecycle() {
    let mut tape = Tape::new();
    assert!(tape.is_empty());
    let a = tape.term("a", 1.);
    assert!(!tape.is_empty());
    assert_eq!(tape.len(), 0);
    let b = tape.constant(2.).unwrap();
    let _ = a + b;
    assert_eq!(tape.len(), 1);
    assert_eq!(tape.node_count(), 3);

    let session = tape.session();
    tape.reset();
    assert!(tape.is_empty());
    assert_eq!(tape.len(), 0);
    assert_ne!(tape.session(), session);
}

#[test]
fn test_record_layout() {
    let tape = Tape::new();
    let a = tape.term("a", 3.);
    let b = tape.term("b", 4.);
    let c = a * b;
    let records = tape.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].inputs(), &[0, 1]);
    assert_eq!(records[0].outputs(), &[c.id().index()]);
    assert!(matches!(records[0].op(), Op::Mul { lhs, rhs } if *lhs == 3. && *rhs == 4.));
}

#[test]
fn test_identity_after_reset() {
    let mut tape = Tape::new();
    let before = tape.term("a", 1.).id();
    tape.reset();
    let after = tape.term("a", 1.).id();
    assert_eq!(before.index(), after.index());
    assert_ne!(before, after);
}

#[test]
fn test_constant_rejects_non_finite() {
    let tape = Tape::new();
    assert!(matches!(tape.constant(f64::NAN), Err(Error::NonFiniteLiteral(v)) if v.is_nan()));
    assert_eq!(
        tape.constant(f64::INFINITY).unwrap_err(),
        Error::NonFiniteLiteral(f64::INFINITY)
    );
    assert_eq!(
        tape.constant(f64::NEG_INFINITY).unwrap_err(),
        Error::NonFiniteLiteral(f64::NEG_INFINITY)
    );
    assert!(tape.is_empty());
    assert!(tape.constant(2.).unwrap().is_constant());
}

#[test]
fn test_records_compare() {
    let tape = Tape::new();
    let a = tape.term("a", 3.);
    let _ = a.sin();
    let _ = a.apply("sq", |x| x * x, |x| 2. * x).unwrap();
    let _ = a.apply("sq", |x| x * x, |x| 2. * x).unwrap();
    let records = tape.records();
    assert_eq!(records[0].op(), &Op::Sin { x: 3. });
    assert_eq!(records[1].op(), records[2].op());
    assert_ne!(records[1], records[2]);
    assert_eq!(records.clone(), records);
}
