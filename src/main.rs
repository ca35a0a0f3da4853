use std::sync::Arc;

use lumia_deployer::ui::{DeployerApp, PanelMarkdown, RfdDialogs, RfdFilePicker};
use lumia_deployer::{CompositionRoot, DialogLevel, DialogService, LogBridge};

#[tokio::main]
async fn main() -> lumia_deployer::Result<()> {
    // =========================================================================
    // COMPOSITION - MUST SUCCEED COMPLETELY OR THE PROCESS EXITS
    // =========================================================================
    let markdown = PanelMarkdown::new();
    let deployer = match CompositionRoot::new()
        .with_dialogs(Arc::new(RfdDialogs))
        .with_file_picker(Arc::new(RfdFilePicker))
        .with_markdown(Arc::new(markdown.clone()))
        .compose()
    {
        Ok(deployer) => deployer,
        Err(e) => {
            eprintln!("[Main] FATAL: Composition failed: {}", e);
            RfdDialogs.show(DialogLevel::Error, "Lumia Deployer", &format!("Failed to start: {}", e));
            return Err(e.into());
        }
    };
    eprintln!("[Main] ✓ Services composed");

    // Wire the `log` crate into the event stream so log::info!() reaches the panel and disk
    if let Err(e) = LogBridge::install(Arc::clone(deployer.bus())) {
        eprintln!("[Main] WARNING: Failed to register the log bridge: {}", e);
    }
    log::info!("Lumia Deployer {} started", lumia_deployer::VERSION);

    // =========================================================================
    // LAUNCH EGUI
    // =========================================================================
    let app = DeployerApp::new(
        deployer.orchestrator(),
        deployer.services().clone(),
        markdown,
        tokio::runtime::Handle::current(),
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1100.0, 720.0]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "Lumia Deployer",
        options,
        Box::new(move |_cc| Box::new(app)),
    );

    // =========================================================================
    // SHUTDOWN
    // =========================================================================
    deployer.shutdown().await;
    eprintln!("[Main] Application shutting down.");

    result.map_err(|e| e.to_string().into())
}
