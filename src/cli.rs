use clap::{Parser, Subcommand};
use crate::dispatch::Dispatch;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "yolo-batch")]
#[command(about = "YOLO物体検出バッチ実行ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像・動画に物体検出を実行
    Detect {
        /// 入力ファイルまたはフォルダ（フォルダは直下のみ）
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// リクエストの分割単位 (per-kind/per-item)
        #[arg(short, long, default_value = "per-kind")]
        dispatch: Dispatch,

        /// 推論エンジンの実行ファイル（デフォルト: $YOLO_BATCH_ENGINE または yolo）
        #[arg(long)]
        engine: Option<String>,

        /// 実行結果をJSONで保存
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// フォルダ内の対応ファイルを一覧表示
    Scan {
        /// フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,
    },

    /// 入力に対応する出力ファイルのパスを表示
    Lookup {
        /// 入力ファイル
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// 出力フォルダ
        #[arg(long)]
        output: Option<String>,

        /// モデルファイル (.pt)
        #[arg(long)]
        model: Option<String>,

        /// 信頼度しきい値 (0, 1]
        #[arg(long)]
        confidence: Option<String>,

        /// 完了時に通知する
        #[arg(long)]
        alert: Option<bool>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
