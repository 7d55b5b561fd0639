use tapegrad::Tape;

#[test]
fn main() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a + b;
    let ac = a + c;
    let abac = ab + ac;

    let grads = abac.backprop().unwrap();
    println!("abac: {abac:#?}");
    assert_eq!(grads.wrt(&a).unwrap(), 2.);
    assert_eq!(grads.wrt(&b).unwrap(), 1.);
    assert_eq!(grads.wrt(&c).unwrap(), 1.);
}

#[test]
fn self_diamond() {
    let tape = Tape::new();
    let x = tape.term("x", 3.);
    let z = x + x;
    assert_eq!(z.value(), 6.);
    assert_eq!(z.derive(&x).unwrap(), 2.);
}

#[test]
fn nested_diamond() {
    // d = (x * y) * (x + y), dd/dx = y * (x + y) + x * y
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 3.);
    let d = (x * y) * (x + y);
    let grads = d.backprop().unwrap();
    assert_eq!(grads.wrt(&x).unwrap(), 3. * 5. + 6.);
    assert_eq!(grads.wrt(&y).unwrap(), 2. * 5. + 6.);
}
