#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mock_exam_parser::run_worker().await {
        eprintln!("mock-exam-parser worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
