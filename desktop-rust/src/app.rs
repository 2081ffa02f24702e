use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, RichText};
use eframe::egui::{FontData, FontDefinitions, FontFamily};
use image::imageops::{self, FilterType};

use crate::io::{default_report_name, pick_media_files, pick_media_folder, pick_model, pick_output_dir, save_report};
use crate::model::{ConfigForm, TableRows, ViewerSink};
use yolo_batch_common::{expected_output_path, StatusTag};
use yolo_batch_rust::config::{CONFIG_DIR, CONFIG_FILE};
use yolo_batch_rust::playback::Frame;
use yolo_batch_rust::{
    ConfigManager, Dispatch, DetectionOrchestrator, FfmpegOpener, JobReport, PlayAffordance, PlaybackSynchronizer,
    SlotId, SourceRegistry, YoloCli,
};

/// Frames wider or taller than this are scaled down before upload.
const MAX_TEXTURE_SIDE: u32 = 1920;
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DesktopApp {
    registry: SourceRegistry,
    table: TableRows,
    orchestrator: DetectionOrchestrator,
    config: ConfigManager,
    form: ConfigForm,
    config_warnings: Vec<String>,
    player: PlaybackSynchronizer<ViewerSink>,
    textures: BTreeMap<SlotId, egui::TextureHandle>,
    selected_index: Option<usize>,
    no_output: bool,
    status: String,
    dialogs: Vec<Dialog>,
    last_report: Option<JobReport>,
}

enum Dialog {
    Info(String),
    Error(String),
}

impl Dialog {
    fn title(&self) -> &'static str {
        match self {
            Dialog::Info(_) => "Detection",
            Dialog::Error(_) => "Error",
        }
    }

    fn text(&self) -> &str {
        match self {
            Dialog::Info(text) | Dialog::Error(text) => text,
        }
    }
}

/// Row the user clicked or toggled during this frame.
enum RowAction {
    Select(usize),
    Include(usize, bool),
}

impl DesktopApp {
    pub fn new() -> Self {
        let (config, warnings) = ConfigManager::load().unwrap_or_else(|err| {
            tracing::error!("cannot resolve working directory: {err}");
            ConfigManager::load_from(Path::new(".").join(CONFIG_DIR).join(CONFIG_FILE), PathBuf::from("."))
        });

        let mut registry = SourceRegistry::new();
        let table = TableRows::attach(&mut registry);
        let form = ConfigForm::from_config(config.config());

        Self {
            registry,
            table,
            orchestrator: DetectionOrchestrator::new(Arc::new(YoloCli::from_env())),
            form,
            config,
            config_warnings: warnings.iter().map(|w| w.to_string()).collect(),
            player: PlaybackSynchronizer::new(Box::new(FfmpegOpener), ViewerSink::default()),
            textures: BTreeMap::new(),
            selected_index: None,
            no_output: false,
            status: String::new(),
            dialogs: Vec::new(),
            last_report: None,
        }
    }

    fn import_files(&mut self) {
        let paths = pick_media_files();
        if paths.is_empty() {
            return;
        }
        let added = self.registry.append_paths(paths);
        self.status = format!("Imported {added} files");
    }

    fn import_folder(&mut self) {
        match pick_media_folder() {
            Ok(Some(paths)) => {
                let added = self.registry.append_paths(paths);
                self.status = format!("Imported {added} files");
            }
            Ok(None) => {}
            Err(err) => self.status = format!("Import failed: {err:#}"),
        }
    }

    fn start_detection(&mut self) {
        match self.orchestrator.start(&mut self.registry, self.config.config()) {
            Ok(ticket) => {
                self.status = format!("Detecting {} items ({} requests)...", ticket.item_count, ticket.request_count);
            }
            Err(err) => self.dialogs.push(Dialog::Error(err.to_string())),
        }
    }

    fn poll_job(&mut self) {
        let Some(report) = self.orchestrator.poll(&mut self.registry) else {
            return;
        };

        self.status = format!(
            "Finished: {} completed, {} failed ({:.1}s)",
            report.completed_count(),
            report.failed_count(),
            report.elapsed().as_secs_f64()
        );
        if self.config.config().alert_after_complete {
            self.dialogs.push(Dialog::Info("Detection finished.".to_string()));
        }
        if let Some(summary) = report.summary() {
            self.dialogs.push(Dialog::Error(summary));
        }

        // The selected row may have an output now.
        if let Some(index) = self.selected_index {
            self.select_row(index);
        }
        self.last_report = Some(report);
    }

    fn save_last_report(&mut self) {
        let Some(report) = &self.last_report else {
            return;
        };
        let Some(path) = rfd::FileDialog::new()
            .set_directory(&self.config.config().output_path)
            .set_file_name(default_report_name(report))
            .save_file()
        else {
            return;
        };
        match save_report(&path, report) {
            Ok(()) => self.status = format!("Saved {}", path.display()),
            Err(err) => self.status = format!("Save failed: {err:#}"),
        }
    }

    /// Binds the row's input and its detection output to the two viewer panes.
    fn select_row(&mut self, index: usize) {
        let Some(item) = self.registry.get(index).cloned() else {
            return;
        };
        self.selected_index = Some(index);
        self.player.reset();
        self.player.sink_mut().pending.clear();
        self.textures.clear();
        self.no_output = false;

        if let Err(err) = self.player.bind(&item.path, SlotId::SOURCE) {
            self.status = format!("Open failed: {err}");
            return;
        }

        let output = expected_output_path(&self.config.config().output_path, &item.path);
        if !output.exists() {
            self.no_output = true;
            return;
        }
        if let Err(err) = self.player.bind(&output, SlotId::OUTPUT) {
            self.status = format!("Open failed: {err}");
        }
    }

    fn apply_settings(&mut self) {
        let update = self.form.to_update(self.config.config());
        if update.is_empty() {
            return;
        }
        let outcome = self.config.validate_and_save(update);
        self.config_warnings = outcome.warnings.iter().map(|w| w.to_string()).collect();
        self.form = ConfigForm::from_config(&outcome.config);
    }

    fn upload_frames(&mut self, ctx: &egui::Context) {
        let pending = std::mem::take(&mut self.player.sink_mut().pending);
        for (slot, frame) in pending {
            let frame = fit_frame(frame);
            let size = [frame.width() as usize, frame.height() as usize];
            let image = egui::ColorImage::from_rgba_unmultiplied(size, frame.as_raw());
            match self.textures.get_mut(&slot) {
                Some(texture) => texture.set(image, egui::TextureOptions::default()),
                None => {
                    let texture = ctx.load_texture(format!("slot-{slot}"), image, egui::TextureOptions::default());
                    self.textures.insert(slot, texture);
                }
            }
        }
    }

    fn render_table(&mut self, ui: &mut egui::Ui) {
        let mut actions = Vec::new();
        let running = self.orchestrator.is_running();

        egui::Grid::new("work_items")
            .striped(true)
            .num_columns(3)
            .min_col_width(24.0)
            .show(ui, |ui| {
                ui.label(RichText::new("Use").strong());
                ui.label(RichText::new("File").strong());
                ui.label(RichText::new("Status").strong());
                ui.end_row();

                for (index, row) in self.table.rows().iter().enumerate() {
                    let mut included = row.included;
                    if ui.checkbox(&mut included, "").changed() {
                        actions.push(RowAction::Include(index, included));
                    }

                    let selected = self.selected_index == Some(index);
                    let response = ui.selectable_label(selected, row.file_name());
                    if response.clicked() {
                        actions.push(RowAction::Select(index));
                    }
                    response.on_hover_text(row.path.display().to_string());

                    ui.label(RichText::new(row.status.label()).color(status_color(row.status)));
                    ui.end_row();
                }
            });

        for action in actions {
            match action {
                RowAction::Select(index) => self.select_row(index),
                RowAction::Include(index, included) => {
                    if let Err(err) = self.registry.set_included(index, included) {
                        tracing::warn!("{err}");
                    }
                }
            }
        }

        if running {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Detection running");
            });
        }
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        let mut changed = false;

        ui.label(RichText::new("Model").strong());
        ui.horizontal(|ui| {
            changed |= ui.text_edit_singleline(&mut self.form.model_path).lost_focus();
            if ui.button("Browse").clicked() {
                if let Some(path) = pick_model(&self.config.config().model_path) {
                    self.form.model_path = path.display().to_string();
                    changed = true;
                }
            }
        });

        ui.label(RichText::new("Confidence").strong());
        changed |= ui.text_edit_singleline(&mut self.form.confidence).lost_focus();

        ui.label(RichText::new("Output folder").strong());
        ui.horizontal(|ui| {
            changed |= ui.text_edit_singleline(&mut self.form.output_path).lost_focus();
            if ui.button("Browse").clicked() {
                if let Some(path) = pick_output_dir(&self.config.config().output_path) {
                    self.form.output_path = path.display().to_string();
                    changed = true;
                }
            }
        });

        changed |= ui.checkbox(&mut self.form.alert_after_complete, "Alert after complete").changed();

        if changed {
            self.apply_settings();
        }

        for warning in &self.config_warnings {
            ui.label(RichText::new(warning).color(Color32::from_rgb(246, 196, 69)).size(12.0));
        }
    }

    fn render_viewer(&mut self, ui: &mut egui::Ui) {
        let pane_width = (ui.available_width() - 12.0).max(0.0) / 2.0;
        let pane_size = egui::vec2(pane_width, (ui.available_height() - 48.0).max(120.0));

        ui.horizontal(|ui| {
            for (slot, title) in [(SlotId::SOURCE, "Input"), (SlotId::OUTPUT, "Output")] {
                ui.vertical(|ui| {
                    ui.label(RichText::new(title).strong());
                    ui.allocate_ui_with_layout(
                        pane_size,
                        egui::Layout::centered_and_justified(egui::Direction::LeftToRight),
                        |ui| match self.textures.get(&slot) {
                            Some(texture) => {
                                ui.add(egui::Image::new(texture).max_size(pane_size).maintain_aspect_ratio(true));
                            }
                            None if slot == SlotId::OUTPUT && self.no_output => {
                                ui.label("No Output");
                            }
                            None => {
                                ui.label("-");
                            }
                        },
                    );
                });
            }
        });

        let Some(max) = self.player.max_position() else {
            return;
        };
        ui.horizontal(|ui| {
            let label = match self.player.sink().affordance {
                PlayAffordance::Play => "▶ Play",
                PlayAffordance::Pause => "⏸ Pause",
            };
            if ui.add_enabled(max > 0, egui::Button::new(label)).clicked() {
                self.player.toggle_play();
            }

            let mut position = self.player.cursor();
            ui.spacing_mut().slider_width = (ui.available_width() - 80.0).max(80.0);
            if ui.add_enabled(max > 0, egui::Slider::new(&mut position, 0..=max)).changed() {
                self.player.seek(position);
            }
        });
    }

    fn show_dialogs(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.dialogs.first() else {
            return;
        };

        let mut close = false;
        egui::Window::new(dialog.title())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(dialog.text());
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    close = true;
                }
            });

        if close {
            self.dialogs.remove(0);
        }
    }
}

pub fn configure_fonts(ctx: &egui::Context) {
    let mut fonts = FontDefinitions::default();
    let candidates = [
        r"C:\Windows\Fonts\meiryo.ttc",
        r"C:\Windows\Fonts\msgothic.ttc",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    ];

    // File names are shown as-is, so fall back to a CJK font when one exists.
    let Some(data) = candidates.iter().find_map(|path| std::fs::read(path).ok()) else {
        return;
    };
    fonts.font_data.insert("cjk_fallback".to_string(), FontData::from_owned(data));
    for family in [FontFamily::Proportional, FontFamily::Monospace] {
        fonts.families.entry(family).or_default().push("cjk_fallback".to_string());
    }
    ctx.set_fonts(fonts);
}

impl eframe::App for DesktopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_job();
        self.table.sync(&self.registry);

        let now = Instant::now();
        self.player.tick(now);
        self.upload_frames(ctx);

        if self.orchestrator.is_running() {
            ctx.request_repaint_after(JOB_POLL_INTERVAL);
        }
        if let Some(wait) = self.player.time_until_tick(now) {
            ctx.request_repaint_after(wait);
        }

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                let running = self.orchestrator.is_running();

                ui.menu_button("File", |ui| {
                    if ui.add_enabled(!running, egui::Button::new("Import Files")).clicked() {
                        self.import_files();
                        ui.close_menu();
                    }
                    if ui.add_enabled(!running, egui::Button::new("Import Folder")).clicked() {
                        self.import_folder();
                        ui.close_menu();
                    }
                    if ui.add_enabled(self.last_report.is_some(), egui::Button::new("Save Report")).clicked() {
                        self.save_last_report();
                        ui.close_menu();
                    }
                });

                ui.menu_button("Dispatch", |ui| {
                    let mut dispatch = self.orchestrator.dispatch();
                    ui.radio_value(&mut dispatch, Dispatch::PerKind, "One request per media kind");
                    ui.radio_value(&mut dispatch, Dispatch::PerItem, "One request per file");
                    self.orchestrator.set_dispatch(dispatch);
                });

                ui.separator();
                let can_detect = !running && self.table.rows().iter().any(|r| r.included);
                if ui.add_enabled(can_detect, egui::Button::new("Detect")).clicked() {
                    self.start_detection();
                }

                if !self.status.is_empty() {
                    ui.separator();
                    ui.label(RichText::new(&self.status).color(Color32::from_gray(170)));
                }
            });
        });

        egui::SidePanel::left("list").resizable(true).default_width(320.0).show(ctx, |ui| {
            ui.heading("Files");
            ui.label(format!(
                "{} items, {} completed, {} failed",
                self.registry.len(),
                self.registry.count_by_status(StatusTag::Completed),
                self.registry.count_by_status(StatusTag::Failed)
            ));
            ui.separator();
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| self.render_table(ui));
        });

        egui::SidePanel::right("settings").resizable(true).default_width(260.0).show(ctx, |ui| {
            ui.heading("Settings");
            ui.separator();
            self.render_settings(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_viewer(ui);
        });

        self.show_dialogs(ctx);
    }
}

fn fit_frame(frame: Frame) -> Frame {
    let (width, height) = frame.dimensions();
    let longest = width.max(height);
    if longest <= MAX_TEXTURE_SIDE {
        return frame;
    }
    let scale = MAX_TEXTURE_SIDE as f64 / longest as f64;
    let target_w = ((width as f64 * scale).round() as u32).max(1);
    let target_h = ((height as f64 * scale).round() as u32).max(1);
    imageops::resize(&frame, target_w, target_h, FilterType::Triangle)
}

fn status_color(status: StatusTag) -> Color32 {
    match status {
        StatusTag::Pending => Color32::from_gray(170),
        StatusTag::Detecting => Color32::from_rgb(246, 196, 69),
        StatusTag::Completed => Color32::from_rgb(96, 192, 120),
        StatusTag::Failed => Color32::from_rgb(224, 92, 92),
    }
}
