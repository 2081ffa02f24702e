mod app;
mod io;
mod model;

use app::{configure_fonts, DesktopApp};

fn main() -> eframe::Result<()> {
    yolo_batch_rust::logging::init(false);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 760.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YOLO Batch Detection",
        options,
        Box::new(|cc| {
            configure_fonts(&cc.egui_ctx);
            Box::new(DesktopApp::new())
        }),
    )
}
