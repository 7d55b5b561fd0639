use std::io::Write;

use crate::{
    grad::Gradients,
    tape::{NodeId, NodeKind, Tape},
    term::TapeTerm,
};

/// Builder for a graphviz dot rendering of the recorded graph.
pub struct DotBuilder<'a> {
    tape: &'a Tape,
    show_values: bool,
    gradients: Option<&'a Gradients>,
    highlights: Option<NodeId>,
}

impl<'a> DotBuilder<'a> {
    pub(crate) fn new(tape: &'a Tape) -> Self {
        Self {
            tape,
            show_values: false,
            gradients: None,
            highlights: None,
        }
    }

    pub fn show_values(mut self, v: bool) -> Self {
        self.show_values = v;
        self
    }

    /// Label every node with its gradient from `grads`.
    pub fn gradients(mut self, grads: &'a Gradients) -> Self {
        self.gradients = Some(grads);
        self
    }

    /// Highlight `term`. A term of another session matches no node.
    pub fn highlights(mut self, term: &TapeTerm) -> Self {
        self.highlights = Some(term.id());
        self
    }

    /// Write graphviz dot file to the given writer.
    pub fn dot(self, writer: &mut impl Write) -> std::io::Result<()> {
        let nodes = self.tape.nodes.borrow();
        let records = self.tape.records.borrow();
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for (idx, node) in nodes.iter().enumerate() {
            let idx = idx as u32;
            let shape = match node.kind {
                NodeKind::Constant => "box",
                _ => "ellipse",
            };
            let mut label = node.name.clone();
            if self.show_values {
                label += &format!("\\ndata:{}", node.data);
            }
            let id = self.tape.node_id(idx);
            if let Some(grad) = self.gradients.and_then(|grads| grads.get(id))
            {
                label += &format!("\\ngrad:{grad}");
            }
            let style = if self.highlights == Some(id) {
                ", style=filled, fillcolor=\"#ffff7f\""
            } else {
                ""
            };
            writeln!(writer, "a{idx} [label=\"{label}\", shape={shape}{style}];")?;
        }
        for record in records.iter() {
            for output in &record.outputs {
                for input in &record.inputs {
                    writeln!(
                        writer,
                        "a{input} -> a{output} [label=\"{}\"];",
                        record.op.name()
                    )?;
                }
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }
}

#[test]
fn test_dot() {
    let tape = Tape::new();
    let a = tape.term("a", 2.);
    let b = a * 3.;
    let grads = b.backprop().unwrap();
    let mut buf = vec![];
    tape.dot_builder()
        .show_values(true)
        .gradients(&grads)
        .highlights(&b)
        .dot(&mut buf)
        .unwrap();
    let dot = String::from_utf8(buf).unwrap();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("a0 [label=\"a\\ndata:2\\ngrad:3\", shape=ellipse];"));
    assert!(dot.contains("a1 [label=\"3\\ndata:3\", shape=box];"));
    assert!(dot.contains("a0 -> a2 [label=\"mul\"];"));
    assert!(dot.contains("a1 -> a2 [label=\"mul\"];"));
    assert!(dot.contains("fillcolor"));
}

#[test]
fn test_foreign_highlight_is_ignored() {
    let tape = Tape::new();
    let other = Tape::new();
    let a = tape.term("a", 2.);
    let _ = a * 3.;
    let stranger = other.term("z", 1.);
    let mut buf = vec![];
    tape.dot_builder().highlights(&stranger).dot(&mut buf).unwrap();
    let dot = String::from_utf8(buf).unwrap();
    assert!(!dot.contains("fillcolor"));
}
