use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use yolo_batch_rust::{cli, config, logging, scanner};
use yolo_batch_rust::{DetectionOrchestrator, SourceRegistry, YoloCli};
use yolo_batch_rust::error::Result;
use yolo_batch_rust::expected_output_path;
use cli::{Cli, Commands};
use config::{ConfigManager, ConfigUpdate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (mut manager, warnings) = ConfigManager::load()?;
    for warning in &warnings {
        println!("⚠ {}", warning);
    }

    match cli.command {
        Commands::Detect { inputs, dispatch, engine, report } => {
            println!("🔍 yolo-batch - 物体検出\n");

            // 1. 入力収集
            println!("[1/3] 入力をスキャン中...");
            let found = scanner::collect_inputs(&inputs)?;
            println!("✔ {}件の入力を検出\n", found.len());

            if found.is_empty() {
                println!("検出対象がありません");
                return Ok(());
            }

            let mut registry = SourceRegistry::new();
            registry.append_paths(found.into_iter().map(|i| i.path));

            // 2. 推論
            let engine = engine.map(YoloCli::new).unwrap_or_else(YoloCli::from_env);
            println!("[2/3] 推論中... ({}, {})", engine.program(), dispatch.label());
            let mut orchestrator = DetectionOrchestrator::new(Arc::new(engine)).with_dispatch(dispatch);
            let ticket = orchestrator.start(&mut registry, manager.config())?;

            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
                spinner.set_style(style);
            }
            spinner.set_message(format!("{}件 / {}リクエスト", ticket.item_count, ticket.request_count));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let Some(job_report) = orchestrator.finished(&mut registry).await else {
                spinner.finish_and_clear();
                return Ok(());
            };
            spinner.finish_and_clear();
            println!(
                "✔ 完了 {}件 / 失敗 {}件 ({:.1}秒)\n",
                job_report.completed_count(),
                job_report.failed_count(),
                job_report.elapsed().as_secs_f64()
            );

            // 3. 結果表示
            println!("[3/3] 結果");
            let output_dir = &manager.config().output_path;
            for item in registry.items() {
                println!(
                    "  {:<10} {} → {}",
                    item.status,
                    item.path.display(),
                    expected_output_path(output_dir, &item.path).display()
                );
            }

            if let Some(summary) = job_report.summary() {
                println!("\n⚠ {}", summary);
            }

            if let Some(report_path) = report {
                let json = serde_json::to_string_pretty(&job_report)?;
                std::fs::write(&report_path, json)?;
                println!("\n✔ 結果を保存: {}", report_path.display());
            }
        }

        Commands::Scan { folder } => {
            let inputs = scanner::scan_folder(&folder)?;
            println!("{}件の入力:", inputs.len());
            for input in inputs {
                println!("  [{}] {}", input.kind, input.path.display());
            }
        }

        Commands::Lookup { input } => {
            let output = expected_output_path(&manager.config().output_path, &input);
            let exists = if output.exists() { "あり" } else { "なし" };
            println!("{} ({})", output.display(), exists);
        }

        Commands::Config { output, model, confidence, alert, show } => {
            let update = ConfigUpdate {
                output_path: output,
                alert_after_complete: alert,
                model_path: model,
                confidence,
            };

            if !update.is_empty() {
                let outcome = manager.validate_and_save(update);
                for warning in &outcome.warnings {
                    println!("⚠ {}", warning);
                }
                println!("✔ 設定を保存しました: {}", manager.path().display());
            }

            if show {
                let config = manager.config();
                println!("設定:");
                println!("  出力フォルダ: {}", config.output_path.display());
                println!("  モデル: {}", config.model_path.display());
                println!("  信頼度: {}", config.confidence);
                println!("  完了通知: {}", if config.alert_after_complete { "有効" } else { "無効" });
            }
        }
    }

    Ok(())
}
