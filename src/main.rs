fn main() -> std::process::ExitCode {
    pension_ingest_lib::run()
}
