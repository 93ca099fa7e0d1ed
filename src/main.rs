use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match ftpdrop::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ftpdrop stopped");
            ExitCode::FAILURE
        }
    }
}
