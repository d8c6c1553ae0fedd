use crate::config::AppConfig;
use crate::distribution::{compute_distribution, table_summaries};
use crate::input::{
    clamp_sample, default_table, import_csv, resize_table, DIAMETER_RANGE, PDI_RANGE, VOLUME_RANGE,
};
use crate::report::{
    batch_file_name, export_batch_pdf, export_csv, export_note_pdf, export_result_pdf,
    note_file_name, report_id, result_file_name,
};
use crate::store::{import_attachments, JsonStore, RecordId, RecordStore};
use crate::structs::{
    Classification, DistributionResult, LabNote, NoteDraft, Sample, NANOMATERIALS,
    SYNTHESIS_METHODS,
};
use chrono::Local;
use eframe::egui;
use egui::Color32;
use egui_plot::{Bar, BarChart, Corner, Legend, LineStyle, Plot, PlotPoints, Points, Polygon, VLine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const BLUE: Color32 = Color32::from_rgb(52, 152, 219);
const ORANGE: Color32 = Color32::from_rgb(230, 126, 34);
const PURPLE: Color32 = Color32::from_rgb(155, 89, 182);
const GREEN: Color32 = Color32::from_rgb(46, 204, 113);
const RED: Color32 = Color32::from_rgb(231, 76, 60);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Page {
    Home,
    Notes,
    Calculator,
    Results,
    Export,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NotesTab {
    New,
    List,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ExportTab {
    Notes,
    Results,
}

enum Status {
    Info(String),
    Error(String),
}

/// Deferred list/row actions, applied after the frame's borrows end.
enum Action {
    ExportNote(RecordId),
    DeleteNote(RecordId),
    ExportResultPdf(RecordId),
    ExportResultCsv(RecordId),
    DeleteResult(RecordId),
}

pub struct PsaApp {
    config: AppConfig,
    page: Page,
    notes: JsonStore<LabNote>,
    results: JsonStore<DistributionResult>,
    draft: NoteDraft,
    notes_tab: NotesTab,
    table: Vec<Sample>,
    num_points: usize,
    current: Option<RecordId>,
    export_tab: ExportTab,
    export_note: Option<RecordId>,
    export_result: Option<RecordId>,
    confirm_clear: bool,
    status: Option<Status>,
}

impl PsaApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let mut status = None;
        let notes = open_store(config.notes_path(), &mut status);
        let results = open_store(config.results_path(), &mut status);
        let num_points = config.default_rows;

        Self {
            page: Page::Home,
            notes,
            results,
            draft: NoteDraft::default(),
            notes_tab: NotesTab::New,
            table: default_table(num_points, &mut rand::rng()),
            num_points,
            current: None,
            export_tab: ExportTab::Results,
            export_note: None,
            export_result: None,
            confirm_clear: false,
            status,
            config,
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.status = Some(Status::Info(message));
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.status = Some(Status::Error(message));
    }

    fn persist_notes(&mut self) {
        if !self.config.autosave {
            return;
        }
        if let Err(err) = self.notes.save() {
            self.fail(format!("Saving notes failed: {err}"));
        }
    }

    fn persist_results(&mut self) {
        if !self.config.autosave {
            return;
        }
        if let Err(err) = self.results.save() {
            self.fail(format!("Saving results failed: {err}"));
        }
    }

    fn compute(&mut self) {
        match compute_distribution(self.table.clone()) {
            Ok(result) => {
                let summary = format!(
                    "PSA computed: D = {:.2} nm, PDI = {:.3} ({})",
                    result.weighted_diameter_mean,
                    result.computed_pdi,
                    result.classification.short_label()
                );
                let id = self.results.add(result);
                self.current = Some(id);
                self.info(summary);
                self.persist_results();
            }
            Err(err) => {
                self.current = None;
                self.fail(format!("Cannot compute PSA: {err}"));
            }
        }
    }

    fn regenerate_table(&mut self) {
        self.table = default_table(self.num_points, &mut rand::rng());
        self.current = None;
    }

    fn import_table(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("CSV / TSV", &["csv", "tsv"])
            .pick_file()
        else {
            return;
        };
        match import_csv(&path) {
            Ok(samples) => {
                let mut table: Vec<Sample> = samples.into_iter().map(clamp_sample).collect();
                if table.len() > self.config.max_rows {
                    warn!(
                        rows = table.len(),
                        max = self.config.max_rows,
                        "imported table truncated"
                    );
                    table.truncate(self.config.max_rows);
                }
                self.num_points = table.len();
                self.table = table;
                self.current = None;
                self.info(format!(
                    "Imported {} rows from {}",
                    self.num_points,
                    path.display()
                ));
            }
            Err(err) => self.fail(format!("Import failed: {err}")),
        }
    }

    fn save_note(&mut self) {
        match self.draft.validate() {
            Ok(mut note) => {
                match import_attachments(&note.image_paths, &self.config.images_dir()) {
                    Ok(paths) => note.image_paths = paths,
                    Err(err) => {
                        self.fail(format!("Attaching images failed: {err}"));
                        return;
                    }
                }
                let title = note.title.clone();
                self.notes.add(note);
                self.draft = NoteDraft::default();
                self.info(format!("Note '{title}' saved"));
                self.persist_notes();
            }
            Err(err) => self.fail(format!("Please complete the required fields (*): {err}")),
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::ExportNote(id) => {
                let Some(note) = self.notes.get(id).cloned() else {
                    return;
                };
                let Some(path) = save_dialog("PDF Files", "pdf", &note_file_name(&note)) else {
                    return;
                };
                match export_note_pdf(&path, &note, &self.config) {
                    Ok(()) => {
                        open_exported(&path);
                        self.info(format!("Note exported to {}", path.display()));
                    }
                    Err(err) => self.fail(format!("PDF export error: {err:#}")),
                }
            }
            Action::DeleteNote(id) => {
                if let Err(err) = self.notes.remove(id) {
                    self.fail(err.to_string());
                    return;
                }
                if self.export_note == Some(id) {
                    self.export_note = None;
                }
                self.persist_notes();
            }
            Action::ExportResultPdf(id) => {
                let (Some(result), Some(number)) =
                    (self.results.get(id).cloned(), self.results.number_of(id))
                else {
                    return;
                };
                let name = result_file_name(number, &result, "pdf");
                let Some(path) = save_dialog("PDF Files", "pdf", &name) else {
                    return;
                };
                match export_result_pdf(&path, number, &result, &self.config) {
                    Ok(()) => {
                        open_exported(&path);
                        self.info(format!("{} exported to {}", report_id(number), path.display()));
                    }
                    Err(err) => self.fail(format!("PDF export error: {err:#}")),
                }
            }
            Action::ExportResultCsv(id) => {
                let (Some(result), Some(number)) =
                    (self.results.get(id).cloned(), self.results.number_of(id))
                else {
                    return;
                };
                let name = result_file_name(number, &result, "csv");
                let Some(path) = save_dialog("CSV Files", "csv", &name) else {
                    return;
                };
                match export_csv(&path, &result) {
                    Ok(()) => self.info(format!("Table exported to {}", path.display())),
                    Err(err) => self.fail(format!("CSV export error: {err:#}")),
                }
            }
            Action::DeleteResult(id) => {
                if let Err(err) = self.results.remove(id) {
                    self.fail(err.to_string());
                    return;
                }
                if self.current == Some(id) {
                    self.current = None;
                }
                if self.export_result == Some(id) {
                    self.export_result = None;
                }
                self.persist_results();
            }
        }
    }

    fn export_batch(&mut self) {
        let Some(path) = save_dialog("PDF Files", "pdf", &batch_file_name()) else {
            return;
        };
        let listed: Vec<(usize, &DistributionResult)> = self
            .results
            .list()
            .into_iter()
            .enumerate()
            .map(|(i, (_, r))| (i + 1, r))
            .collect();
        let outcome = export_batch_pdf(&path, &listed, &self.config);
        match outcome {
            Ok(()) => {
                open_exported(&path);
                self.info(format!("Batch report exported to {}", path.display()));
            }
            Err(err) => self.fail(format!("PDF export error: {err:#}")),
        }
    }

    fn backup(&mut self) {
        let dir = self.config.backup_dir();
        let outcome = self
            .notes
            .backup(&dir)
            .and_then(|a| self.results.backup(&dir).map(|b| a.is_some() || b.is_some()));
        match outcome {
            Ok(true) => self.info(format!("Backup written to {}", dir.display())),
            Ok(false) => self.info("Nothing saved on disk yet, no backup written"),
            Err(err) => self.fail(format!("Backup failed: {err}")),
        }
    }

    fn clear_all(&mut self) {
        let outcome = self.notes.clear().and_then(|_| self.results.clear());
        self.current = None;
        self.export_note = None;
        self.export_result = None;
        self.confirm_clear = false;
        match outcome {
            Ok(()) => self.info("All notes and results deleted"),
            Err(err) => self.fail(format!("Clearing data failed: {err}")),
        }
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        let mut dismiss = false;
        if let Some(status) = &self.status {
            let (text, color) = match status {
                Status::Info(text) => (text.as_str(), GREEN),
                Status::Error(text) => (text.as_str(), RED),
            };
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(text).color(color).strong());
                if ui.small_button("✖").clicked() {
                    dismiss = true;
                }
            });
            ui.separator();
        }
        if dismiss {
            self.status = None;
        }
    }

    fn home_page(&mut self, ui: &mut egui::Ui) {
        section_title(ui, "WELCOME TO NANOLAB PSA", BLUE);
        ui.add_space(8.0);
        ui.columns(2, |cols| {
            cols[0].label(egui::RichText::new("About").size(15.0).strong());
            cols[0].label(
                "Record nanomaterial practice sessions, calculate particle size analysis (PSA) \
                 from diameter, % volume and PDI data, analyse the size distribution, and export \
                 notes and results as PDF or CSV.",
            );
            cols[0].add_space(8.0);
            cols[0].label(egui::RichText::new("Features").size(15.0).strong());
            for line in [
                "1. Lab notes: experiment data, synthesis parameters, result images",
                "2. PSA calculator: weighted statistics, quality grade, charts",
                "3. Export: note and result reports, batch summary, CSV tables",
            ] {
                cols[0].label(line);
            }

            cols[1].label(egui::RichText::new("Quick guide").size(15.0).strong());
            for line in [
                "1. Use the side menu to navigate",
                "2. Start by recording a lab note",
                "3. Compute PSA results with the calculator",
                "4. Export the results in the format you need",
            ] {
                cols[1].label(line);
            }
            cols[1].add_space(8.0);
            cols[1].label(egui::RichText::new("Quality bands").size(15.0).strong());
            egui::Grid::new("bands").num_columns(3).show(&mut cols[1], |ui| {
                for band in Classification::ALL {
                    let (r, g, b) = band.grade().rgb();
                    ui.label(
                        egui::RichText::new(band.grade().as_str())
                            .strong()
                            .color(Color32::from_rgb(r, g, b)),
                    );
                    ui.label(band.range_text());
                    ui.label(band.label());
                    ui.end_row();
                }
            });
        });
    }

    fn notes_page(&mut self, ui: &mut egui::Ui) {
        section_title(ui, "LAB PRACTICE NOTES", ORANGE);
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.notes_tab, NotesTab::New, "📄 New note");
            ui.selectable_value(
                &mut self.notes_tab,
                NotesTab::List,
                format!("📚 Saved notes ({})", self.notes.len()),
            );
        });
        ui.separator();

        match self.notes_tab {
            NotesTab::New => self.note_form(ui),
            NotesTab::List => {
                let mut action = None;
                if self.notes.is_empty() {
                    empty_hint(ui, "No lab notes yet. Create a new note first.");
                }
                for (id, note) in self.notes.list() {
                    egui::CollapsingHeader::new(format!("📋 {} - {}", note.title, note.date))
                        .id_salt(id)
                        .show(ui, |ui| {
                            note_preview(ui, note);
                            ui.horizontal(|ui| {
                                if ui.button("📥 Export PDF").clicked() {
                                    action = Some(Action::ExportNote(id));
                                }
                                if ui.button("🗑 Delete").clicked() {
                                    action = Some(Action::DeleteNote(id));
                                }
                            });
                        });
                }
                if let Some(action) = action {
                    self.apply(action);
                }
            }
        }
    }

    fn note_form(&mut self, ui: &mut egui::Ui) {
        let draft = &mut self.draft;
        ui.columns(2, |cols| {
            egui::Grid::new("note_form_left")
                .num_columns(2)
                .spacing([8.0, 6.0])
                .show(&mut cols[0], |ui| {
                    ui.label("Practice title*");
                    ui.text_edit_singleline(&mut draft.title);
                    ui.end_row();

                    ui.label("Practitioner*");
                    ui.text_edit_singleline(&mut draft.practitioner);
                    ui.end_row();

                    ui.label("Date* (YYYY-MM-DD)");
                    ui.text_edit_singleline(&mut draft.date);
                    ui.end_row();

                    ui.label("Nanomaterial*");
                    choice(ui, "nanomaterial", &mut draft.nanomaterial, &NANOMATERIALS);
                    ui.end_row();

                    if draft.nanomaterial == "Other" {
                        ui.label("Specify nanomaterial");
                        ui.text_edit_singleline(&mut draft.custom_nanomaterial);
                        ui.end_row();
                    }
                });

            egui::Grid::new("note_form_right")
                .num_columns(2)
                .spacing([8.0, 6.0])
                .show(&mut cols[1], |ui| {
                    ui.label("Synthesis method*");
                    choice(ui, "method", &mut draft.synthesis_method, &SYNTHESIS_METHODS);
                    ui.end_row();

                    if draft.synthesis_method == "Other" {
                        ui.label("Specify method");
                        ui.text_edit_singleline(&mut draft.custom_method);
                        ui.end_row();
                    }

                    ui.label("Temperature (°C)");
                    ui.add(
                        egui::DragValue::new(&mut draft.temperature_c)
                            .range(0.0..=1000.0)
                            .speed(1.0),
                    );
                    ui.end_row();

                    ui.label("Duration (h)");
                    ui.add(
                        egui::DragValue::new(&mut draft.duration_h)
                            .range(0.0..=100.0)
                            .speed(0.1),
                    );
                    ui.end_row();
                });
        });

        ui.add_space(6.0);
        ui.label(egui::RichText::new("Procedure*").strong());
        ui.add(
            egui::TextEdit::multiline(&mut draft.procedure)
                .desired_rows(6)
                .desired_width(f32::INFINITY)
                .hint_text("1. Prepare materials...\n2. Mix...\n3. Heat to..."),
        );
        ui.label(egui::RichText::new("Observations*").strong());
        ui.add(
            egui::TextEdit::multiline(&mut draft.observations)
                .desired_rows(6)
                .desired_width(f32::INFINITY)
                .hint_text("Colour, shape, characteristics of the nanomaterial..."),
        );

        ui.add_space(6.0);
        ui.label(egui::RichText::new("Result images").strong());
        ui.horizontal(|ui| {
            if ui.button("Attach images...").clicked() {
                if let Some(paths) = rfd::FileDialog::new()
                    .add_filter("Images", &["jpg", "jpeg", "png"])
                    .pick_files()
                {
                    draft.image_paths.extend(paths);
                }
            }
            ui.label(format!("{} attached", draft.image_paths.len()));
        });
        let mut detach = None;
        for (i, path) in draft.image_paths.iter().enumerate() {
            ui.horizontal(|ui| {
                ui.label(path.display().to_string());
                if ui.small_button("✖").clicked() {
                    detach = Some(i);
                }
            });
        }
        if let Some(i) = detach {
            draft.image_paths.remove(i);
        }

        ui.add_space(6.0);
        ui.label(egui::RichText::new("Additional parameters").strong());
        egui::Grid::new("note_form_extra")
            .num_columns(2)
            .spacing([8.0, 6.0])
            .show(ui, |ui| {
                ui.label("Solution pH");
                ui.add(egui::Slider::new(&mut draft.ph, 0.0..=14.0).fixed_decimals(1));
                ui.end_row();

                ui.label("Concentration (mg/mL)");
                ui.add(
                    egui::DragValue::new(&mut draft.concentration_mg_ml)
                        .range(0.0..=f64::MAX)
                        .speed(0.1),
                );
                ui.end_row();

                ui.label("Solvent");
                ui.text_edit_singleline(&mut draft.solvent);
                ui.end_row();
            });
        ui.label("Additional notes");
        ui.add(
            egui::TextEdit::multiline(&mut draft.extra_notes)
                .desired_rows(3)
                .desired_width(f32::INFINITY),
        );

        ui.add_space(8.0);
        let save = egui::Button::new(egui::RichText::new("💾 Save note").strong()).fill(GREEN);
        if ui.add_sized([180.0, 30.0], save).clicked() {
            self.save_note();
        }
    }

    fn calculator_page(&mut self, ui: &mut egui::Ui) {
        section_title(ui, "PSA CALCULATOR", PURPLE);
        ui.label(format!(
            "1. Set the number of data points (minimum {}). 2. Enter diameter (nm), % volume and \
             PDI for every point. 3. Press Compute. 4. Export the result from Saved Results.",
            self.config.min_rows
        ));
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            ui.label("Data points");
            let resp = ui.add(
                egui::DragValue::new(&mut self.num_points)
                    .range(self.config.min_rows..=self.config.max_rows),
            );
            if resp.changed() {
                resize_table(&mut self.table, self.num_points);
                self.current = None;
            }
            if ui.button("🔄 Generate table").clicked() {
                self.regenerate_table();
            }
            if ui.button("📂 Import CSV...").clicked() {
                self.import_table();
            }
        });
        ui.add_space(6.0);

        let min_rows = self.config.min_rows;
        let max_rows = self.config.max_rows;
        let mut remove = None;
        let mut edited = false;
        egui::Grid::new("sample_table")
            .num_columns(5)
            .striped(true)
            .spacing([12.0, 4.0])
            .show(ui, |ui| {
                for header in ["#", "Diameter (nm)", "% Volume", "PDI", ""] {
                    ui.label(egui::RichText::new(header).strong());
                }
                ui.end_row();

                let can_remove = self.table.len() > min_rows;
                for (i, sample) in self.table.iter_mut().enumerate() {
                    ui.label((i + 1).to_string());
                    edited |= ui
                        .add(
                            egui::DragValue::new(&mut sample.diameter)
                                .range(DIAMETER_RANGE)
                                .speed(0.5)
                                .fixed_decimals(2),
                        )
                        .changed();
                    edited |= ui
                        .add(
                            egui::DragValue::new(&mut sample.volume_fraction)
                                .range(VOLUME_RANGE)
                                .speed(0.1)
                                .fixed_decimals(2),
                        )
                        .changed();
                    edited |= ui
                        .add(
                            egui::DragValue::new(&mut sample.pdi)
                                .range(PDI_RANGE)
                                .speed(0.001)
                                .fixed_decimals(3),
                        )
                        .changed();
                    if ui
                        .add_enabled(can_remove, egui::Button::new("✖").small())
                        .clicked()
                    {
                        remove = Some(i);
                    }
                    ui.end_row();
                }
            });
        if let Some(i) = remove {
            self.table.remove(i);
            self.num_points = self.table.len();
            edited = true;
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.table.len() < max_rows, egui::Button::new("➕ Add row"))
                .clicked()
            {
                self.num_points = self.table.len() + 1;
                resize_table(&mut self.table, self.num_points);
                edited = true;
            }
            let total: f64 = self.table.iter().map(|s| s.volume_fraction).sum();
            ui.label(format!("Σ % volume = {:.2}", total));
        });
        if edited {
            self.current = None;
        }

        ui.add_space(8.0);
        let run_btn = egui::Button::new(egui::RichText::new("🧮 COMPUTE PSA").size(13.0).strong())
            .fill(GREEN);
        if ui.add_sized([ui.available_width(), 32.0], run_btn).clicked() {
            self.compute();
        }
        ui.add_space(8.0);

        let mut action = None;
        if let Some((id, result)) = self
            .current
            .and_then(|id| self.results.get(id).map(|r| (id, r)))
        {
            result_metrics(ui, result);
            ui.add_space(8.0);
            result_plots(ui, result, &id.to_string());
            egui::CollapsingHeader::new("🔍 Calculation details")
                .default_open(false)
                .show(ui, |ui| result_details(ui, result));
            ui.horizontal(|ui| {
                if ui.button("📥 Export PDF").clicked() {
                    action = Some(Action::ExportResultPdf(id));
                }
                if ui.button("📄 Export CSV").clicked() {
                    action = Some(Action::ExportResultCsv(id));
                }
            });
        }
        if let Some(action) = action {
            self.apply(action);
        }
    }

    fn results_page(&mut self, ui: &mut egui::Ui) {
        section_title(ui, "SAVED PSA RESULTS", GREEN);
        if self.results.is_empty() {
            empty_hint(ui, "No PSA results yet. Use the PSA calculator first.");
            return;
        }
        ui.label(egui::RichText::new(format!("Total {} PSA results", self.results.len())).strong());
        ui.add_space(6.0);

        let mut action = None;
        for (n, (id, result)) in self.results.list().into_iter().enumerate() {
            let title = format!(
                "📋 PSA result #{} - {}",
                n + 1,
                result.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
            egui::CollapsingHeader::new(title).id_salt(id).show(ui, |ui| {
                result_metrics(ui, result);
                ui.add_space(4.0);
                sample_table(ui, result, &id.to_string());
                ui.horizontal(|ui| {
                    if ui.button("📥 Export PDF").clicked() {
                        action = Some(Action::ExportResultPdf(id));
                    }
                    if ui.button("📄 Export CSV").clicked() {
                        action = Some(Action::ExportResultCsv(id));
                    }
                    if ui.button("🗑 Delete").clicked() {
                        action = Some(Action::DeleteResult(id));
                    }
                });
            });
        }
        if let Some(action) = action {
            self.apply(action);
        }
    }

    fn export_page(&mut self, ui: &mut egui::Ui) {
        section_title(ui, "EXPORT DATA", BLUE);
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.export_tab, ExportTab::Notes, "📝 Lab notes");
            ui.selectable_value(&mut self.export_tab, ExportTab::Results, "📊 PSA results");
        });
        ui.separator();

        let mut action = None;
        match self.export_tab {
            ExportTab::Notes => {
                if self.notes.is_empty() {
                    empty_hint(ui, "No notes to export yet.");
                } else {
                    let options: Vec<(RecordId, String)> = self
                        .notes
                        .list()
                        .into_iter()
                        .enumerate()
                        .map(|(i, (id, n))| (id, format!("{}: {} - {}", i + 1, n.title, n.date)))
                        .collect();
                    pick_record(ui, "export_note", &mut self.export_note, &options);
                    if let Some(note) = self.export_note.and_then(|id| self.notes.get(id)) {
                        egui::CollapsingHeader::new("👁 Preview")
                            .default_open(true)
                            .show(ui, |ui| note_preview(ui, note));
                        if ui.button("📥 Export note to PDF").clicked() {
                            action = self.export_note.map(Action::ExportNote);
                        }
                    }
                }
            }
            ExportTab::Results => {
                if self.results.is_empty() {
                    empty_hint(ui, "No PSA results to export yet.");
                } else {
                    let options: Vec<(RecordId, String)> = self
                        .results
                        .list()
                        .into_iter()
                        .enumerate()
                        .map(|(i, (id, r))| {
                            (
                                id,
                                format!(
                                    "Result #{} - D={:.2}nm, PDI={:.3}",
                                    i + 1,
                                    r.weighted_diameter_mean,
                                    r.computed_pdi
                                ),
                            )
                        })
                        .collect();
                    pick_record(ui, "export_result", &mut self.export_result, &options);
                    if let Some(id) = self.export_result {
                        if let Some(result) = self.results.get(id) {
                            egui::CollapsingHeader::new("👁 Preview")
                                .default_open(true)
                                .show(ui, |ui| {
                                    result_metrics(ui, result);
                                    sample_table(ui, result, "export_preview");
                                });
                            ui.horizontal(|ui| {
                                if ui.button("📥 Export result to PDF").clicked() {
                                    action = Some(Action::ExportResultPdf(id));
                                }
                                if ui.button("📄 Export table to CSV").clicked() {
                                    action = Some(Action::ExportResultCsv(id));
                                }
                            });
                        }
                    }
                    ui.add_space(6.0);
                    if ui.button("🗂 Export batch report (all results)").clicked() {
                        self.export_batch();
                    }
                }
            }
        }
        if let Some(action) = action {
            self.apply(action);
        }

        ui.add_space(12.0);
        ui.separator();
        ui.label(egui::RichText::new("DATA MANAGEMENT").size(13.0).strong().color(ORANGE));
        ui.label(format!("Data directory: {}", self.config.data_dir.display()));
        for (name, path) in [("Notes", self.notes.path()), ("Results", self.results.path())] {
            let shown = path.map_or("not saved (in memory)".to_string(), |p| p.display().to_string());
            ui.label(format!("{name} file: {shown}"));
        }
        ui.horizontal(|ui| {
            if ui.button("Backup data").clicked() {
                self.backup();
            }
            ui.checkbox(&mut self.confirm_clear, "Confirm");
            if ui
                .add_enabled(self.confirm_clear, egui::Button::new("Clear all data").fill(RED))
                .clicked()
            {
                self.clear_all();
            }
        });
    }
}

impl eframe::App for PsaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("header")
            .exact_height(60.0)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                ui.vertical_centered(|ui| {
                    ui.label(
                        egui::RichText::new("🔬 NANOLAB PSA")
                            .size(24.0)
                            .strong()
                            .color(BLUE),
                    );
                });
            });

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new(format!("🔬 NanoLab PSA v{}", env!("CARGO_PKG_VERSION")))
                        .size(10.0),
                );
                ui.separator();
                ui.label(
                    egui::RichText::new(format!(
                        "{} notes · {} results",
                        self.notes.len(),
                        self.results.len()
                    ))
                    .size(10.0)
                    .color(Color32::DARK_GRAY),
                );
            });
        });

        egui::SidePanel::left("menu")
            .min_width(220.0)
            .max_width(220.0)
            .show(ctx, |ui| {
                ui.add_space(3.0);
                ui.label(egui::RichText::new("MENU").size(13.0).strong().color(ORANGE));
                ui.separator();
                for (label, page) in [
                    ("🏠 Home", Page::Home),
                    ("📝 Lab notes", Page::Notes),
                    ("🧮 PSA calculator", Page::Calculator),
                    ("📊 Saved results", Page::Results),
                    ("📁 Export", Page::Export),
                ] {
                    let button = egui::Button::new(label).selected(self.page == page);
                    if ui.add_sized([ui.available_width(), 28.0], button).clicked() {
                        self.page = page;
                    }
                }
                ui.add_space(6.0);
                ui.separator();
                ui.label(egui::RichText::new("ABOUT").size(13.0).strong().color(PURPLE));
                ui.label(
                    egui::RichText::new(
                        "1. Record nanomaterial practice\n2. Compute PSA results\n\
                         3. Export notes and results",
                    )
                    .size(11.0),
                );
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.status_bar(ui);
                match self.page {
                    Page::Home => self.home_page(ui),
                    Page::Notes => self.notes_page(ui),
                    Page::Calculator => self.calculator_page(ui),
                    Page::Results => self.results_page(ui),
                    Page::Export => self.export_page(ui),
                }
                ui.add_space(15.0);
            });
        });
    }
}

fn open_store<T>(path: PathBuf, status: &mut Option<Status>) -> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    match JsonStore::load(path.clone()) {
        Ok(store) => store,
        Err(err) => {
            // Keep the unreadable file untouched; work in memory instead.
            error!("{err}");
            *status = Some(Status::Error(format!(
                "Could not read {}, working without saving: {err}",
                path.display()
            )));
            JsonStore::in_memory()
        }
    }
}

fn save_dialog(filter: &str, extension: &str, default_name: &str) -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(filter, &[extension])
        .set_file_name(default_name)
        .save_file()
}

fn open_exported(path: &Path) {
    if let Err(err) = opener::open(path) {
        warn!(path = %path.display(), "cannot open exported file: {err}");
    }
}

fn section_title(ui: &mut egui::Ui, text: &str, color: Color32) {
    ui.label(egui::RichText::new(text).size(18.0).strong().color(color));
    ui.add_space(4.0);
}

fn empty_hint(ui: &mut egui::Ui, text: &str) {
    ui.add_space(3.0);
    ui.label(
        egui::RichText::new(text)
            .size(12.0)
            .italics()
            .color(Color32::DARK_GRAY),
    );
}

fn choice(ui: &mut egui::Ui, id: &str, value: &mut String, options: &[&str]) {
    egui::ComboBox::from_id_salt(id)
        .selected_text(value.as_str())
        .show_ui(ui, |ui| {
            for option in options {
                ui.selectable_value(value, option.to_string(), *option);
            }
        });
}

fn pick_record(
    ui: &mut egui::Ui,
    id: &str,
    selected: &mut Option<RecordId>,
    options: &[(RecordId, String)],
) {
    if selected.map_or(true, |s| !options.iter().any(|(id, _)| *id == s)) {
        *selected = options.first().map(|(id, _)| *id);
    }
    let current = options
        .iter()
        .find(|(id, _)| Some(*id) == *selected)
        .map(|(_, label)| label.as_str())
        .unwrap_or("");
    egui::ComboBox::from_id_salt(id)
        .width(360.0)
        .selected_text(current)
        .show_ui(ui, |ui| {
            for (record, label) in options {
                ui.selectable_value(selected, Some(*record), label.as_str());
            }
        });
}

fn note_preview(ui: &mut egui::Ui, note: &LabNote) {
    egui::Grid::new(("note_preview", note.created_at.timestamp_nanos_opt()))
        .num_columns(4)
        .spacing([12.0, 2.0])
        .show(ui, |ui| {
            let rows = [
                (
                    "Practitioner",
                    note.practitioner.clone(),
                    "Temperature",
                    format!("{} °C", note.temperature_c),
                ),
                (
                    "Date",
                    note.date.to_string(),
                    "Duration",
                    format!("{} h", note.duration_h),
                ),
                (
                    "Nanomaterial",
                    note.nanomaterial.clone(),
                    "pH",
                    format!("{:.1}", note.ph),
                ),
                (
                    "Method",
                    note.synthesis_method.clone(),
                    "Concentration",
                    format!("{} mg/mL", note.concentration_mg_ml),
                ),
                (
                    "Images",
                    note.image_paths.len().to_string(),
                    "Solvent",
                    note.solvent.clone(),
                ),
            ];
            for (l1, v1, l2, v2) in rows {
                ui.label(egui::RichText::new(l1).strong());
                ui.label(v1);
                ui.label(egui::RichText::new(l2).strong());
                ui.label(v2);
                ui.end_row();
            }
        });
}

fn result_metrics(ui: &mut egui::Ui, result: &DistributionResult) {
    let (r, g, b) = result.grade.rgb();
    let grade_color = Color32::from_rgb(r, g, b);
    ui.columns(3, |cols| {
        metric(
            &mut cols[0],
            "Mean diameter (nm)",
            format!("{:.2}", result.weighted_diameter_mean),
            format!("± {:.2} nm", result.standard_deviation),
        );
        metric(
            &mut cols[1],
            "Computed PDI",
            format!("{:.3}", result.computed_pdi),
            result.classification.short_label().to_string(),
        );
        metric(
            &mut cols[2],
            "Mean input PDI",
            format!("{:.3}", result.weighted_pdi_mean),
            String::new(),
        );
    });
    ui.label(
        egui::RichText::new(format!(
            "● Grade {}: {}",
            result.grade,
            result.classification.label()
        ))
        .strong()
        .color(grade_color),
    );
}

fn metric(ui: &mut egui::Ui, label: &str, value: String, delta: String) {
    ui.group(|ui| {
        ui.label(egui::RichText::new(label).size(11.0).color(Color32::GRAY));
        ui.label(egui::RichText::new(value).size(20.0).strong());
        if !delta.is_empty() {
            ui.label(egui::RichText::new(delta).size(11.0).color(BLUE));
        }
    });
}

fn result_plots(ui: &mut egui::Ui, result: &DistributionResult, salt: &str) {
    let plot_width = ui.available_width() - 20.0;
    let plot_height = 240.0;
    let mean = result.weighted_diameter_mean;
    let sd = result.standard_deviation;
    let max_w = result.normalized_weights().into_iter().fold(0.0, f64::max);

    let mut diameters: Vec<f64> = result.samples.iter().map(|s| s.diameter).collect();
    diameters.sort_by(|a, b| a.total_cmp(b));
    let bar_width = diameters
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 0.0)
        .fold(f64::INFINITY, f64::min);
    let bar_width = if bar_width.is_finite() {
        bar_width * 0.7
    } else {
        (mean * 0.1).max(1.0)
    };

    ui.group(|ui| {
        ui.label(
            egui::RichText::new("PARTICLE SIZE DISTRIBUTION")
                .size(14.0)
                .strong()
                .color(ORANGE),
        );
        Plot::new(("size_plot", salt))
            .width(plot_width)
            .height(plot_height)
            .allow_zoom(true)
            .allow_drag(true)
            .x_axis_label("Diameter (nm)")
            .y_axis_label("% Volume")
            .legend(Legend::default().position(Corner::RightTop))
            .show(ui, |plot_ui| {
                let band = PlotPoints::new(vec![
                    [mean - sd, 0.0],
                    [mean + sd, 0.0],
                    [mean + sd, max_w * 1.1],
                    [mean - sd, max_w * 1.1],
                ]);
                plot_ui.polygon(
                    Polygon::new(format!("±1σ ({:.2} nm)", sd), band)
                        .fill_color(Color32::from_rgba_unmultiplied(231, 76, 60, 30))
                        .stroke(egui::Stroke::NONE),
                );
                let bars: Vec<Bar> = result
                    .samples
                    .iter()
                    .map(|s| Bar::new(s.diameter, s.normalized_weight).width(bar_width))
                    .collect();
                plot_ui.bar_chart(
                    BarChart::new("% Volume", bars).color(Color32::from_rgb(65, 105, 225)),
                );
                plot_ui.vline(
                    VLine::new(format!("Mean: {:.2} nm", mean), mean)
                        .color(RED)
                        .width(2.0)
                        .style(LineStyle::dashed_loose()),
                );
            });
    });

    ui.add_space(12.0);

    ui.group(|ui| {
        ui.label(
            egui::RichText::new("DIAMETER vs PDI")
                .size(14.0)
                .strong()
                .color(PURPLE),
        );
        Plot::new(("pdi_plot", salt))
            .width(plot_width)
            .height(plot_height)
            .allow_zoom(true)
            .allow_drag(true)
            .x_axis_label("Diameter (nm)")
            .y_axis_label("PDI")
            .show(ui, |plot_ui| {
                for s in &result.samples {
                    let t = if max_w > 0.0 {
                        s.normalized_weight / max_w
                    } else {
                        0.0
                    };
                    plot_ui.points(
                        Points::new(
                            format!("{:.2} nm", s.diameter),
                            PlotPoints::new(vec![[s.diameter, s.pdi]]),
                        )
                        .radius(4.0 + 12.0 * t as f32)
                        .filled(true)
                        .color(volume_color(t)),
                    );
                }
            });
    });
}

fn volume_color(t: f64) -> Color32 {
    let t = t.clamp(0.0, 1.0) as f32;
    BLUE.lerp_to_gamma(ORANGE, t)
}

fn result_details(ui: &mut egui::Ui, result: &DistributionResult) {
    ui.columns(2, |cols| {
        cols[0].label(egui::RichText::new("Descriptive statistics (diameter)").strong());
        if let Some((d, _, _)) = table_summaries(result) {
            egui::Grid::new("describe")
                .num_columns(2)
                .show(&mut cols[0], |ui| {
                    for (name, value) in [
                        ("count", d.count as f64),
                        ("mean", d.mean),
                        ("std", d.std_dev),
                        ("min", d.min),
                        ("50%", d.median),
                        ("max", d.max),
                    ] {
                        ui.label(name);
                        ui.label(format!("{:.2}", value));
                        ui.end_row();
                    }
                });
        }

        let (min, max) = result.diameter_range();
        let ui = &mut cols[1];
        ui.label(egui::RichText::new("Quality parameters").strong());
        ui.label(format!("Standard deviation: {:.2} nm", result.standard_deviation));
        ui.label(format!("Variance: {:.2} nm²", result.variance));
        ui.label(format!("Range: {:.2} - {:.2} nm", min, max));
        ui.label(format!(
            "Coefficient of variation: {:.2}%",
            result.coefficient_of_variation
        ));
        ui.label(format!(
            "Mode: {:.2} nm ({:.1}% volume)",
            result.mode_diameter, result.mode_percentage
        ));
        let (r, g, b) = result.grade.rgb();
        ui.label(
            egui::RichText::new(format!("Classification: {}", result.classification))
                .strong()
                .color(Color32::from_rgb(r, g, b)),
        );
        ui.add_space(4.0);
        ui.label(egui::RichText::new("Recommendation").strong());
        ui.label(result.classification.advice());
    });
}

fn sample_table(ui: &mut egui::Ui, result: &DistributionResult, salt: &str) {
    egui::Grid::new(("samples", salt))
        .num_columns(5)
        .striped(true)
        .spacing([12.0, 2.0])
        .show(ui, |ui| {
            for header in ["#", "Diameter (nm)", "% Volume", "PDI", "Cumulative %"] {
                ui.label(egui::RichText::new(header).strong());
            }
            ui.end_row();
            for (i, s) in result.samples.iter().enumerate() {
                ui.label((i + 1).to_string());
                ui.label(format!("{:.2}", s.diameter));
                ui.label(format!("{:.2}", s.normalized_weight));
                ui.label(format!("{:.3}", s.pdi));
                ui.label(format!("{:.2}", s.cumulative_weight));
                ui.end_row();
            }
        });
}
