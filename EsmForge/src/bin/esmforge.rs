fn main() -> anyhow::Result<()> {
    esmforge::cli::run_cli()
}
