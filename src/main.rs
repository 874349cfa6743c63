use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match lessonflow::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(lessonflow::errors::get_exit_code(&e))
        }
    }
}
