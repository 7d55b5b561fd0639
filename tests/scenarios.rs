use approx::assert_abs_diff_eq;
use tapegrad::{error::Error, Tape};

#[test]
fn log_product_sine() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let f = x.ln().unwrap() + x * y - y.sin();
    assert_abs_diff_eq!(f.value(), 2f64.ln() + 10. - 5f64.sin(), epsilon = 1e-12);

    let grads = tape.grad(f).unwrap();
    assert_abs_diff_eq!(grads.wrt(&x).unwrap(), 5.5, epsilon = 1e-12);
    assert_abs_diff_eq!(grads.wrt(&y).unwrap(), 2. - 5f64.cos(), epsilon = 1e-12);
    assert_abs_diff_eq!(grads.wrt(&y).unwrap(), 1.7163, epsilon = 1e-4);
}

#[test]
fn add_to_itself() {
    let tape = Tape::new();
    let x = tape.term("x", 3.);
    let z = x + x;
    let grads = z.backprop().unwrap();
    assert_eq!(grads.wrt(&x).unwrap(), 2.);
}

#[test]
fn log_domain() {
    let tape = Tape::new();
    for value in [-1., 0., f64::NAN] {
        let x = tape.term("x", value);
        match x.ln() {
            Err(Error::Domain { op, .. }) => assert_eq!(op, "ln"),
            other => panic!("expected a domain error, got {other:?}"),
        }
    }
    assert_eq!(tape.len(), 0);
}

#[test]
fn log_domain_of_derived_term() {
    let tape = Tape::new();
    let x = tape.term("x", 1.);
    let zero = x - x;
    assert!(matches!(zero.ln(), Err(Error::Domain { value, .. }) if value == 0.));
    assert_eq!(tape.len(), 1);
}

#[test]
fn dead_branch() {
    let tape = Tape::new();
    let x = tape.term("x", 4.);
    let y = x * 2;
    let w = x * 3;
    let grads = tape.grad(y).unwrap();
    assert_eq!(grads.wrt(&x).unwrap(), 2.);
    assert_eq!(grads.get(w.id()), None);
}

#[test]
fn grad_wrt_filter() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let unused = tape.term("unused", 1.);
    let f = x * y;
    let grads = tape.grad_wrt(f, &[y, x, unused]).unwrap();
    assert_eq!(grads, vec![2., 5., 0.]);
}

#[test]
fn supplemental_operators() {
    let tape = Tape::new();
    let x = tape.term("x", 0.5);
    let f = x.exp() / x.cos() - -x;
    let grads = f.backprop().unwrap();
    // d/dx (e^x / cos x + x) = e^x / cos x + e^x sin x / cos^2 x + 1
    let (e, c, s) = (0.5f64.exp(), 0.5f64.cos(), 0.5f64.sin());
    assert_abs_diff_eq!(f.value(), e / c + 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(
        grads.wrt(&x).unwrap(),
        e / c + e * s / (c * c) + 1.,
        epsilon = 1e-12
    );
}
