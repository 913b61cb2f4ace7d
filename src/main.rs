#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mock_exam_parser::run().await {
        eprintln!("mock-exam-parser fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
