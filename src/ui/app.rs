//! Main window: deployment options, the four operations, progress and the live log.
//!
//! Buttons never call the orchestrator from the UI thread; each click spawns one
//! [`dispatch`] on the tokio runtime and the result is polled every frame.

use eframe::egui;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use super::log_panel::LogPanel;
use super::pickers::{MarkdownNote, PanelMarkdown};
use crate::error::DeployError;
use crate::events::LogLevel;
use crate::invocation::{dispatch, validate_deploy_args, DeployArgs, Invocation, InvocationError};
use crate::models::DeploymentResult;
use crate::orchestrator::{AutoDeployer, Orchestrator};
use crate::services::{DialogLevel, Services, WIM_FILTER};

type DispatchOutcome = Result<DeploymentResult, InvocationError>;

/// Operation in flight.
struct PendingRun {
    verb: &'static str,
    rx: oneshot::Receiver<DispatchOutcome>,
}

pub struct DeployerApp {
    orchestrator: Arc<Orchestrator>,
    services: Services,
    runtime: tokio::runtime::Handle,
    markdown: PanelMarkdown,

    log_panel: LogPanel,
    progress_rx: watch::Receiver<Option<f32>>,

    // Deploy form
    wim_path: String,
    image_index: u32,
    reserved_gb: f64,
    validation_messages: Vec<String>,

    pending: Option<PendingRun>,
    status: String,
    notes: Vec<MarkdownNote>,
}

impl DeployerApp {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        services: Services,
        markdown: PanelMarkdown,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let settings = services.settings.get();
        DeployerApp {
            log_panel: LogPanel::new(&services.bus, LogLevel::Information),
            progress_rx: services.progress.watch(),
            orchestrator,
            services,
            runtime,
            markdown,
            wim_path: String::new(),
            image_index: settings.default_image_index,
            reserved_gb: settings.default_reserved_gb,
            validation_messages: Vec::new(),
            pending: None,
            status: "Ready".to_string(),
            notes: Vec::new(),
        }
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn start(&mut self, invocation: Invocation) {
        if self.is_busy() {
            return;
        }
        let verb = invocation.verb();
        let orchestrator = Arc::clone(&self.orchestrator);
        let options = Arc::clone(&self.services.options);
        let (tx, rx) = oneshot::channel();

        self.runtime.spawn(async move {
            let outcome = dispatch(orchestrator.as_ref(), &options, invocation).await;
            let _ = tx.send(outcome);
        });

        self.validation_messages.clear();
        self.status = format!("Running {}...", verb);
        self.pending = Some(PendingRun { verb, rx });
    }

    fn poll_pending(&mut self) {
        let outcome = match self.pending.as_mut() {
            Some(pending) => match pending.rx.try_recv() {
                Ok(outcome) => Ok((pending.verb, outcome)),
                Err(oneshot::error::TryRecvError::Empty) => return,
                Err(oneshot::error::TryRecvError::Closed) => Err(pending.verb),
            },
            None => return,
        };
        self.pending = None;

        match outcome {
            Ok((verb, Ok(Ok(report)))) => {
                self.status = format!("{} completed", verb);
                let mut message = format!("{} completed: {}", verb, report.completed_steps.join(" -> "));
                if let Some(change) = report.dual_boot {
                    message = if change.changed() {
                        format!("Dual boot is now {}", if change.current { "enabled" } else { "disabled" })
                    } else {
                        "Dual boot was already in the requested state".to_string()
                    };
                }
                self.services.dialogs.show(DialogLevel::Info, "Done", &message);
            }
            Ok((verb, Ok(Err(err)))) => {
                self.status = format!("{} failed", verb);
                let level = match err {
                    DeployError::Cancelled { .. } | DeployError::OperationInProgress { .. } => DialogLevel::Warning,
                    _ => DialogLevel::Error,
                };
                self.services.dialogs.show(level, &format!("{} failed", verb), &err.user_message());
            }
            Ok((verb, Err(InvocationError::Invalid(messages)))) => {
                self.status = format!("{}: invalid options", verb);
                self.validation_messages = messages;
            }
            Err(verb) => {
                self.status = format!("{}: worker stopped unexpectedly", verb);
                eprintln!("[UI] Dispatch task for {} ended without a result", verb);
            }
        }
    }

    fn render_options(&mut self, ui: &mut egui::Ui) {
        ui.heading("Deployment");
        ui.add_space(4.0);

        ui.label("Windows image (WIM):");
        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.wim_path);
            if ui.button("Browse...").clicked() {
                if let Some(path) = self.services.file_picker.pick_file("Select a Windows image", &WIM_FILTER) {
                    self.wim_path = path.display().to_string();
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label("Image index:");
            ui.add(egui::DragValue::new(&mut self.image_index).clamp_range(1..=64));
        });
        ui.horizontal(|ui| {
            ui.label("Reserved for Windows (GB):");
            ui.add(
                egui::DragValue::new(&mut self.reserved_gb)
                    .clamp_range(1.0..=256.0)
                    .speed(0.5),
            );
        });

        for message in &self.validation_messages {
            ui.colored_label(egui::Color32::from_rgb(255, 100, 100), message);
        }

        ui.add_space(8.0);
        let idle = !self.is_busy();
        if ui.add_enabled(idle, egui::Button::new("Deploy Windows")).clicked() {
            let wim = self.wim_path.trim();
            let args = DeployArgs {
                wim: if wim.is_empty() { None } else { Some(wim.into()) },
                index: Some(self.image_index as i64),
                reserved_gb: Some(self.reserved_gb),
            };
            match validate_deploy_args(&args) {
                Ok(_) => self.start(Invocation::Deploy(args)),
                Err(messages) => self.validation_messages = messages,
            }
        }

        ui.separator();
        ui.heading("Device");
        ui.horizontal(|ui| {
            if ui.add_enabled(idle, egui::Button::new("Enable dual boot")).clicked() {
                self.start(Invocation::EnableDualBoot);
            }
            if ui.add_enabled(idle, egui::Button::new("Disable dual boot")).clicked() {
                self.start(Invocation::DisableDualBoot);
            }
        });
        let has_gpu = self.orchestrator.sections().find_kind(crate::sections::SectionKind::Gpu).is_some();
        if ui
            .add_enabled(idle && has_gpu, egui::Button::new("Install GPU drivers"))
            .clicked()
        {
            self.start(Invocation::InstallGpu);
        }

        ui.separator();
        self.render_settings(ui);
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        ui.collapsing("Settings", |ui| {
            let settings = self.services.settings.get();
            ui.label(format!("Phone MainOS: {}", settings.device_root.display()));
            ui.label(format!("EFIESP: {}", settings.efiesp_root.display()));
            ui.horizontal(|ui| {
                ui.label(format!("GPU drivers: {}", settings.gpu_driver_path.display()));
                if ui.add_enabled(!self.is_busy(), egui::Button::new("Change...")).clicked() {
                    if let Some(path) = self.services.file_picker.pick_folder("Select the GPU driver package") {
                        if let Err(e) = self.services.settings.update(|s| s.gpu_driver_path = path) {
                            self.services
                                .dialogs
                                .show(DialogLevel::Error, "Settings", &e.to_string());
                        }
                    }
                }
            });
        });
    }

    fn render_progress(&mut self, ui: &mut egui::Ui) {
        let snapshot = self.orchestrator.phase();
        ui.horizontal(|ui| {
            ui.label("Phase:");
            ui.colored_label(
                egui::Color32::from_rgb(70, 180, 255),
                format!("[{}]", snapshot.phase.as_str().to_uppercase()),
            );
            ui.label(&self.status);
            if self.is_busy() && ui.button("Cancel").clicked() {
                self.orchestrator.cancel();
            }
        });

        if self.is_busy() {
            match *self.progress_rx.borrow() {
                Some(percent) => {
                    ui.add(egui::ProgressBar::new(percent / 100.0).show_percentage());
                }
                None => {
                    ui.add(egui::ProgressBar::new(0.0).animate(true));
                }
            }
        }
    }

    fn render_notes(&mut self, ctx: &egui::Context) {
        let mut closed = Vec::new();
        for (idx, note) in self.notes.iter().enumerate() {
            let mut open = true;
            egui::Window::new(&note.title)
                .id(egui::Id::new(("note", idx)))
                .open(&mut open)
                .show(ctx, |ui| {
                    ui.monospace(&note.markdown);
                });
            if !open {
                closed.push(idx);
            }
        }
        for idx in closed.into_iter().rev() {
            self.notes.remove(idx);
        }
    }
}

impl eframe::App for DeployerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_pending();
        let new_lines = self.log_panel.poll();
        self.notes.extend(self.markdown.take_notes());

        egui::SidePanel::left("options").min_width(320.0).show(ctx, |ui| {
            self.render_options(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_progress(ui);
            ui.separator();
            let log_file = self
                .services
                .bus
                .sink()
                .map(|sink| sink.log_file_at(chrono::Local::now()).display().to_string());
            self.log_panel.show(ui, log_file);
        });

        self.render_notes(ctx);

        if self.is_busy() || new_lines {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
