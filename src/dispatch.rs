use clap::ValueEnum;

/// 推論リクエストの分割単位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Dispatch {
    /// 画像・動画ごとに1リクエスト
    #[default]
    PerKind,
    /// 1ファイル1リクエスト（失敗を1件に閉じ込める）
    PerItem,
}

impl Dispatch {
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::PerKind => "per-kind",
            Dispatch::PerItem => "per-item",
        }
    }
}
