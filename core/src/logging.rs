/// Host-process logging initialization.
///
/// Honors `RUST_LOG` when set, otherwise logs the engine at debug and
/// everything else at info. Called once at the start of `ChatEngine::new`;
/// hosts that installed their own subscriber first win, the second install
/// is silently ignored.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_core=debug,info".into()),
        )
        .try_init();
}
