use tapegrad::Tape;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let f = x.ln()? + x * y - y.sin();
    println!("ln(x) + x * y - sin(y) = {}", f.value());

    let grads = f.backprop()?;
    println!("df / dx = {}", grads.wrt(&x)?);
    println!("df / dy = {}", grads.wrt(&y)?);

    if std::env::args().any(|arg| arg == "--dot") {
        tape.dot_builder()
            .show_values(true)
            .gradients(&grads)
            .highlights(&f)
            .dot(&mut std::io::stdout())?;
    }
    Ok(())
}
