fn main() -> std::process::ExitCode {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("Panic: {:?}", info);
    }));
    apk_store_lib::run()
}
