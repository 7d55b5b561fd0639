use std::collections::HashSet;

use tapegrad::{error::Error, Tape};
use test_log::test;

#[test]
fn reset_gives_disjoint_identities() {
    let mut tape = Tape::new();
    let before: HashSet<_> = {
        let x = tape.term("x", 1.);
        let y = x * x + 1;
        [x.id(), y.id()].into_iter().collect()
    };
    let old_session = tape.session();
    tape.reset();
    assert!(tape.is_empty());

    let x = tape.term("x", 1.);
    let y = x * x + 1;
    assert_ne!(tape.session(), old_session);
    assert!(!before.contains(&x.id()));
    assert!(!before.contains(&y.id()));
}

#[test]
fn grad_after_reset_ignores_old_tape() {
    let mut tape = Tape::new();
    {
        let x = tape.term("x", 10.);
        let _ = x * x * x;
    }
    tape.reset();
    let x = tape.term("x", 2.);
    let y = x * 3.;
    assert_eq!(tape.len(), 1);
    assert_eq!(y.derive(&x).unwrap(), 3.);
}

#[test]
fn old_gradients_do_not_resolve_new_ids() {
    let mut tape = Tape::new();
    let grads = {
        let x = tape.term("x", 1.);
        (x * 2.).backprop().unwrap()
    };
    tape.reset();
    let x = tape.term("x", 1.);
    assert_eq!(grads.get(x.id()), None);
    assert!(matches!(grads.wrt(&x), Err(Error::ForeignTerm { .. })));
}

#[test]
fn foreign_term_is_rejected() {
    let tape1 = Tape::new();
    let tape2 = Tape::new();
    let a = tape1.term("a", 1.);
    let b = tape2.term("b", 2.);

    let err = a.try_mul(b).unwrap_err();
    assert_eq!(
        err,
        Error::ForeignTerm {
            expected: tape1.session(),
            found: tape2.session(),
        }
    );
    assert_eq!(tape1.len(), 0);
    assert!(matches!(tape1.grad(b), Err(Error::ForeignTerm { .. })));

    let c = a.sin();
    let grads = c.backprop().unwrap();
    assert!(matches!(grads.wrt(&b), Err(Error::ForeignTerm { .. })));
}

#[test]
#[should_panic(expected = "term belongs to session")]
fn foreign_term_panics_in_operator() {
    let tape1 = Tape::new();
    let tape2 = Tape::new();
    let _ = tape1.term("a", 1.) + tape2.term("b", 2.);
}

#[test]
#[should_panic(expected = "`div` is not defined")]
fn division_by_zero_panics_in_operator() {
    let tape = Tape::new();
    let _ = tape.term("a", 1.) / 0;
}

#[test]
fn sessions_per_thread() {
    let handles: Vec<_> = (1..=4)
        .map(|i| {
            std::thread::spawn(move || {
                let tape = Tape::new();
                let x = tape.term("x", i as f64);
                let y = x * x * x;
                (tape.session(), y.derive(&x).unwrap())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let sessions: HashSet<_> = results.iter().map(|(s, _)| *s).collect();
    assert_eq!(sessions.len(), 4);
    for (i, (_, grad)) in results.iter().enumerate() {
        let x = (i + 1) as f64;
        assert_eq!(*grad, 3. * x * x);
    }
}

#[test]
fn grad_does_not_mutate_tape() {
    let tape = Tape::new();
    let x = tape.term("x", 1.5);
    let y = (x * x).sin();
    let len = tape.len();
    let first = y.backprop().unwrap();
    let second = y.backprop().unwrap();
    assert_eq!(tape.len(), len);
    assert_eq!(first.wrt(&x).unwrap(), second.wrt(&x).unwrap());
}
