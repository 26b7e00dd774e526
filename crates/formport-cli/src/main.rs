fn main() -> std::process::ExitCode {
    formport_cli::run()
}
