fn main() -> anyhow::Result<()> {
    let cli = build_profiler_cli::init();
    build_profiler_cli::execute(cli)
}
