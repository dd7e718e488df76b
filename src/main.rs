//! OroDC CLI entry point

use orodc::dispatch::Dispatcher;

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let code = match Dispatcher::from_env() {
        Ok(dispatcher) => dispatcher.dispatch(&argv).await,
        Err(err) => {
            eprintln!("orodc: {}", err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}
