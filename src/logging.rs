//! tracing 初期化
//!
//! `RUST_LOG` があればそれを優先する。

use tracing_subscriber::EnvFilter;

pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug,yolo_batch_rust=debug"
    } else {
        "info"
    }
}

/// 標準エラーへ出力するサブスクライバを登録（二重登録は無視）
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
