//! The reverse pass: replay the tape backwards and accumulate gradients.

use log::debug;

use crate::{
    error::{Error, Result},
    tape::{NodeId, NodeKind, Tape},
    term::TapeTerm,
};

/// A snapshot of the gradients of one terminal with respect to every node
/// that contributed to it.
#[derive(Clone, Debug)]
pub struct Gradients {
    session: u64,
    grads: Vec<Option<f64>>,
}

impl Gradients {
    /// Gradient of the node `id`, or `None` if it received no contribution
    /// or belongs to another session.
    pub fn get(&self, id: NodeId) -> Option<f64> {
        if id.session() != self.session {
            return None;
        }
        self.grads.get(id.index() as usize).copied().flatten()
    }

    /// Gradient with respect to `term`. A term that did not contribute to the
    /// terminal has a gradient of 0.
    pub fn wrt(&self, term: &TapeTerm) -> Result<f64> {
        let id = term.id();
        if id.session() != self.session {
            return Err(Error::foreign(self.session, id.session()));
        }
        Ok(self.get(id).unwrap_or(0.))
    }

    /// Number of nodes with an entry.
    pub fn len(&self) -> usize {
        self.grads.iter().filter(|g| g.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        let session = self.session;
        self.grads.iter().enumerate().filter_map(move |(i, g)| {
            g.map(|g| {
                let id = NodeId::new(session, i as u32);
                (id, g)
            })
        })
    }
}

/// Seed `terminal` with 1 and walk the records in reverse append order.
pub(crate) fn backprop(tape: &Tape, terminal: u32) -> Gradients {
    let nodes = tape.nodes.borrow();
    let records = tape.records.borrow();
    debug!(
        "backprop from a{terminal} over {} records, session {}",
        records.len(),
        tape.session()
    );

    let mut grads = vec![None; nodes.len()];
    grads[terminal as usize] = Some(1.);

    for record in records.iter().rev() {
        let output_grads: Vec<f64> = record
            .outputs
            .iter()
            .map(|&output| grads[output as usize].unwrap_or(0.))
            .collect();
        let input_grads = record.op.propagate(&output_grads);
        for (&input, contribution) in record.inputs.iter().zip(input_grads) {
            if nodes[input as usize].kind == NodeKind::Constant {
                continue;
            }
            let grad: &mut Option<f64> = &mut grads[input as usize];
            *grad = Some(grad.unwrap_or(0.) + contribution);
        }
    }

    Gradients {
        session: tape.session(),
        grads,
    }
}

#[test]
fn test_accumulation() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a + b;
    let ac = a + c;
    let abac = ab + ac;
    let grads = abac.backprop().unwrap();
    assert_eq!(grads.wrt(&a).unwrap(), 2.);
    assert_eq!(grads.wrt(&b).unwrap(), 1.);
    assert_eq!(grads.wrt(&c).unwrap(), 1.);
    assert_eq!(grads.wrt(&abac).unwrap(), 1.);
}

#[test]
fn test_unconsumed_output() {
    let tape = Tape::new();
    let x = tape.term("x", 4.);
    let y = x * 2.;
    let w = x * 3.;
    let grads = y.backprop().unwrap();
    assert_eq!(grads.wrt(&x).unwrap(), 2.);
    assert_eq!(grads.get(w.id()), None);
    assert_eq!(grads.wrt(&w).unwrap(), 0.);
}

#[test]
fn test_constants_have_no_entry() {
    let tape = Tape::new();
    let x = tape.term("x", 4.);
    let two = tape.constant(2.).unwrap();
    let y = x * two;
    let grads = y.backprop().unwrap();
    assert_eq!(grads.get(two.id()), None);
    assert_eq!(grads.get(x.id()), Some(2.));
    assert_eq!(grads.len(), 2);
    let ids: Vec<_> = grads.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![x.id(), y.id()]);
}

#[test]
fn test_snapshot_is_independent() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = x * x;
    let first = y.backprop().unwrap();
    let second = y.backprop().unwrap();
    assert_eq!(first.wrt(&x).unwrap(), 4.);
    assert_eq!(second.wrt(&x).unwrap(), 4.);
    assert_eq!(tape.len(), 1);
}
