use crate::config::AppConfig;
use crate::distribution::table_summaries;
use crate::structs::{Classification, DistributionResult, LabNote};
use anyhow::Context;
use chrono::{Local, Utc};
use genpdf::Element;
use genpdf::{elements, style, Alignment};
use plotters::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

const ACCENT: (u8, u8, u8) = (46, 134, 171);
const SECONDARY: (u8, u8, u8) = (162, 59, 114);

macro_rules! row {
    ($table:ident, $($cell:expr),+ $(,)?) => {{
        $table
            .row()
            $(.element(elements::Paragraph::new($cell).padded(1)))+
            .push()
            .ok();
    }};
}

macro_rules! header_row {
    ($table:ident, $color:expr, $($cell:expr),+ $(,)?) => {{
        let (r, g, b) = $color;
        let header_style = style::Style::new()
            .bold()
            .with_color(style::Color::Rgb(r, g, b));
        $table
            .row()
            $(.element(elements::Paragraph::new($cell).styled(header_style).padded(1)))+
            .push()
            .ok();
    }};
}

fn heading(text: &str, size: u8) -> elements::Paragraph {
    let (r, g, b) = ACCENT;
    elements::Paragraph::new(style::StyledString::new(
        text.to_string(),
        style::Style::new()
            .bold()
            .with_font_size(size)
            .with_color(style::Color::Rgb(r, g, b)),
    ))
}

fn new_document(title: &str, config: &AppConfig) -> anyhow::Result<genpdf::Document> {
    let font_family = genpdf::fonts::from_files(&config.font_dir, &config.font_family, None)
        .with_context(|| {
            format!(
                "failed to load font family '{}' from {}",
                config.font_family,
                config.font_dir.display()
            )
        })?;

    let mut doc = genpdf::Document::new(font_family);
    doc.set_title(title);
    doc.set_font_size(10);

    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(15);
    doc.set_page_decorator(decorator);
    Ok(doc)
}

fn render(doc: genpdf::Document, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    doc.render(file)?;
    info!(path = %path.display(), "wrote PDF");
    Ok(())
}

/// Full single-result report: summary, quality interpretation, distribution
/// table, descriptive statistics and charts.
pub fn export_result_pdf(
    path: &Path,
    number: usize,
    result: &DistributionResult,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mut doc = new_document("Particle Size Analysis Report", config)?;

    doc.push(heading("NANOMATERIAL LABORATORY", 18).aligned(Alignment::Center));
    doc.push(
        elements::Paragraph::new("PARTICLE SIZE DISTRIBUTION ANALYSIS REPORT")
            .aligned(Alignment::Center)
            .styled(style::Style::new().bold().with_font_size(13)),
    );
    doc.push(elements::Break::new(1));

    let mut info_table = elements::TableLayout::new(vec![1, 3]);
    info_table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
    row!(info_table, "Report ID", report_id(number));
    row!(
        info_table,
        "Analysis date",
        result
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    );
    row!(info_table, "Data points", format!("{} points", result.sample_count));
    row!(
        info_table,
        "Generated by",
        format!("NanoLab PSA v{}", env!("CARGO_PKG_VERSION"))
    );
    doc.push(info_table);
    doc.push(elements::Break::new(1));

    doc.push(heading("RESULT SUMMARY", 14));
    doc.push(elements::Break::new(0.5));
    let mut summary = elements::TableLayout::new(vec![3, 2, 1, 4]);
    summary.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
    header_row!(summary, ACCENT, "PARAMETER", "VALUE", "UNIT", "NOTE");
    for [name, value, unit, note] in summary_rows(result) {
        row!(summary, name, value, unit, note);
    }
    doc.push(summary);
    doc.push(elements::Break::new(1));

    doc.push(heading("QUALITY INTERPRETATION", 14));
    doc.push(elements::Break::new(0.5));
    let mut quality = elements::TableLayout::new(vec![2, 2, 3]);
    quality.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
    header_row!(quality, result.grade.rgb(), "INDICATOR", "VALUE", "STATUS");
    row!(
        quality,
        "PDI score",
        format!("{:.3}", result.computed_pdi),
        result.grade.quality_text()
    );
    row!(
        quality,
        "Uniformity",
        format!("{:.1}%", result.uniformity()),
        "Degree of size uniformity"
    );
    row!(
        quality,
        "Classification",
        result.grade.as_str(),
        result.classification.label()
    );
    doc.push(quality);
    doc.push(elements::Break::new(0.5));

    let mut recommendations = elements::UnorderedList::new();
    for line in result.classification.recommendation() {
        recommendations.push(elements::Paragraph::new(*line));
    }
    doc.push(recommendations);

    doc.push(elements::PageBreak::new());

    doc.push(heading("SIZE DISTRIBUTION DATA", 14));
    doc.push(elements::Break::new(0.5));
    let mut dist = elements::TableLayout::new(vec![1, 2, 2, 2, 2]);
    dist.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
    header_row!(dist, ACCENT, "No", "Diameter (nm)", "% Volume", "PDI", "Cumulative %");
    for [no, d, v, p, c] in distribution_rows(result) {
        row!(dist, no, d, v, p, c);
    }
    doc.push(dist);
    doc.push(elements::Break::new(1));

    let stats = statistics_rows(result);
    if !stats.is_empty() {
        doc.push(heading("DESCRIPTIVE STATISTICS", 14));
        doc.push(elements::Break::new(0.5));
        let mut table = elements::TableLayout::new(vec![2, 2, 2, 2]);
        table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
        header_row!(table, SECONDARY, "Statistic", "Diameter (nm)", "% Volume", "PDI");
        for [name, d, v, p] in stats {
            row!(table, name, d, v, p);
        }
        doc.push(table);
    }

    doc.push(elements::PageBreak::new());
    doc.push(heading("CHARTS", 14));
    doc.push(elements::Break::new(0.5));
    push_plot(&mut doc, result, generate_size_plot);
    doc.push(elements::Break::new(0.5));
    push_plot(&mut doc, result, generate_pdi_plot);

    doc.push(elements::Break::new(1));
    doc.push(elements::Paragraph::new("NOTES").styled(style::Style::new().bold()));
    doc.push(elements::Paragraph::new(
        "PDI (polydispersity index) indicates how uniform the particle sizes are.",
    ));
    for band in Classification::ALL {
        doc.push(elements::Paragraph::new(format!(
            "{}: {} (grade {})",
            band.range_text(),
            band.label(),
            band.grade()
        )));
    }

    render(doc, path)
}

fn push_plot(
    doc: &mut genpdf::Document,
    result: &DistributionResult,
    draw: fn(&Path, &DistributionResult) -> anyhow::Result<()>,
) {
    let temp = match tempfile::Builder::new()
        .prefix("psa_plot")
        .suffix(".png")
        .tempfile()
    {
        Ok(temp) => temp,
        Err(err) => {
            warn!("cannot create chart file: {err}");
            return;
        }
    };
    if let Err(err) = draw(temp.path(), result) {
        warn!("chart rendering failed: {err:#}");
        return;
    }
    match elements::Image::from_path(temp.path()) {
        Ok(img) => doc.push(
            img.with_alignment(Alignment::Center)
                .with_scale(genpdf::Scale::new(0.6, 0.6)),
        ),
        Err(err) => warn!("cannot embed chart: {err}"),
    }
}

/// One summary line per stored result.
pub fn export_batch_pdf(
    path: &Path,
    results: &[(usize, &DistributionResult)],
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mut doc = new_document("PSA Batch Report", config)?;

    doc.push(heading("BATCH REPORT - NANOMATERIAL PSA", 16).aligned(Alignment::Center));
    doc.push(elements::Paragraph::new(format!(
        "Total reports: {} | Date: {}",
        results.len(),
        Local::now().format("%d %B %Y")
    )));
    doc.push(elements::Break::new(1));

    let mut table = elements::TableLayout::new(vec![1, 2, 2, 2, 4, 1]);
    table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
    header_row!(table, ACCENT, "No", "ID", "Diameter (nm)", "PDI", "Classification", "Grade");
    for (i, (number, result)) in results.iter().enumerate() {
        row!(
            table,
            (i + 1).to_string(),
            report_id(*number),
            format!("{:.1}", result.weighted_diameter_mean),
            format!("{:.3}", result.computed_pdi),
            result.classification.short_label(),
            result.grade.as_str()
        );
    }
    doc.push(table);

    render(doc, path)
}

/// Lab-practice note as a printable document.
pub fn export_note_pdf(path: &Path, note: &LabNote, config: &AppConfig) -> anyhow::Result<()> {
    let mut doc = new_document(&note.title, config)?;

    doc.push(heading("NANOMATERIAL PRACTICE REPORT", 16).aligned(Alignment::Center));
    doc.push(
        elements::Paragraph::new(note.title.as_str())
            .aligned(Alignment::Center)
            .styled(style::Style::new().bold().with_font_size(13)),
    );
    doc.push(elements::Break::new(1));

    let sections: [(&str, Vec<(&str, String)>); 3] = [
        (
            "GENERAL INFORMATION",
            vec![
                ("Practitioner", note.practitioner.clone()),
                ("Practice date", note.date.format("%Y-%m-%d").to_string()),
                (
                    "Saved at",
                    note.created_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string(),
                ),
            ],
        ),
        (
            "NANOMATERIAL",
            vec![
                ("Nanomaterial", note.nanomaterial.clone()),
                ("Synthesis method", note.synthesis_method.clone()),
                ("Solvent", note.solvent.clone()),
            ],
        ),
        (
            "SYNTHESIS PARAMETERS",
            vec![
                ("Temperature", format!("{} °C", note.temperature_c)),
                ("Duration", format!("{} h", note.duration_h)),
                ("pH", format!("{:.1}", note.ph)),
                ("Concentration", format!("{} mg/mL", note.concentration_mg_ml)),
            ],
        ),
    ];
    for (title, fields) in sections {
        doc.push(heading(title, 12));
        let mut table = elements::TableLayout::new(vec![1, 2]);
        for (label, value) in fields {
            row!(table, label, value);
        }
        doc.push(table);
        doc.push(elements::Break::new(0.5));
    }

    for (title, text) in [
        ("PROCEDURE", &note.procedure),
        ("OBSERVATIONS", &note.observations),
        ("ADDITIONAL NOTES", &note.extra_notes),
    ] {
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        doc.push(heading(title, 12));
        for line in lines {
            doc.push(elements::Paragraph::new(line));
        }
        doc.push(elements::Break::new(0.5));
    }

    if !note.image_paths.is_empty() {
        doc.push(heading("DOCUMENTATION", 12));
        for image_path in &note.image_paths {
            match elements::Image::from_path(image_path) {
                Ok(img) => doc.push(img.with_alignment(Alignment::Center)),
                Err(err) => warn!(path = %image_path.display(), "skipping image: {err}"),
            }
        }
    }

    doc.push(elements::Break::new(1));
    doc.push(
        elements::Paragraph::new(format!(
            "Generated with NanoLab PSA on {}",
            Local::now().format("%d %B %Y %H:%M:%S")
        ))
        .aligned(Alignment::Center)
        .styled(style::Style::new().italic().with_font_size(8)),
    );

    render(doc, path)
}

/// Normalized distribution table as CSV.
pub fn export_csv(path: &Path, result: &DistributionResult) -> anyhow::Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("cannot create {}", path.display()))?;
    wtr.write_record([
        "No",
        "Diameter (nm)",
        "% Volume",
        "% Volume Normalized",
        "PDI",
        "Cumulative %",
    ])?;
    for (i, s) in result.samples.iter().enumerate() {
        wtr.write_record(&[
            (i + 1).to_string(),
            s.diameter.to_string(),
            s.volume_fraction.to_string(),
            s.normalized_weight.to_string(),
            s.pdi.to_string(),
            s.cumulative_weight.to_string(),
        ])?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = result.samples.len(), "wrote CSV");
    Ok(())
}

pub fn report_id(number: usize) -> String {
    format!("PSA-{:03}", number)
}

pub fn result_file_name(number: usize, result: &DistributionResult, extension: &str) -> String {
    format!(
        "psa_report_{}_{}.{}",
        number,
        result
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d_%H-%M-%S"),
        extension
    )
}

pub fn batch_file_name() -> String {
    format!("psa_batch_report_{}.pdf", Utc::now().format("%Y%m%d_%H%M%S"))
}

pub fn note_file_name(note: &LabNote) -> String {
    let safe_title: String = note
        .title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    format!("lab_note_{}_{}.pdf", safe_title, note.date.format("%Y-%m-%d"))
}

/// Parameter, value, unit and remark for each headline statistic.
pub fn summary_rows(result: &DistributionResult) -> Vec<[String; 4]> {
    vec![
        [
            "Mean diameter".into(),
            format!("{:.2}", result.weighted_diameter_mean),
            "nm".into(),
            "Volume-weighted average".into(),
        ],
        [
            "Computed PDI".into(),
            format!("{:.3}", result.computed_pdi),
            String::new(),
            result.classification.label().into(),
        ],
        [
            "Standard deviation".into(),
            format!("{:.2}", result.standard_deviation),
            "nm".into(),
            format!("± {:.1} nm", result.standard_deviation),
        ],
        [
            "Coefficient of variation".into(),
            format!("{:.1}", result.coefficient_of_variation),
            "%".into(),
            "CV = (σ/μ)×100%".into(),
        ],
        [
            "Mode diameter".into(),
            format!("{:.1}", result.mode_diameter),
            "nm".into(),
            format!("{:.1}% volume", result.mode_percentage),
        ],
        [
            "Variance".into(),
            format!("{:.2}", result.variance),
            "nm²".into(),
            "σ²".into(),
        ],
        [
            "Mean input PDI".into(),
            format!("{:.3}", result.weighted_pdi_mean),
            String::new(),
            "Volume-weighted average".into(),
        ],
        [
            "Quality grade".into(),
            result.grade.to_string(),
            String::new(),
            result.grade.quality_text().into(),
        ],
    ]
}

/// Per-row table with running cumulative volume, closed by a summary row.
pub fn distribution_rows(result: &DistributionResult) -> Vec<[String; 5]> {
    let mut rows: Vec<[String; 5]> = result
        .samples
        .iter()
        .enumerate()
        .map(|(i, s)| {
            [
                (i + 1).to_string(),
                format!("{:.2}", s.diameter),
                format!("{:.2}", s.normalized_weight),
                format!("{:.3}", s.pdi),
                format!("{:.2}", s.cumulative_weight),
            ]
        })
        .collect();

    let total: f64 = result.samples.iter().map(|s| s.normalized_weight).sum();
    let mean_pdi =
        result.samples.iter().map(|s| s.pdi).sum::<f64>() / result.samples.len().max(1) as f64;
    rows.push([
        "SUMMARY".into(),
        format!("Avg: {:.2}", result.weighted_diameter_mean),
        format!("Total: {:.2}", total),
        format!("Avg: {:.3}", mean_pdi),
        "100.00".into(),
    ]);
    rows
}

/// Min/max/mean/median/spread per column. The diameter spread is the weighted
/// one reported by the engine.
pub fn statistics_rows(result: &DistributionResult) -> Vec<[String; 4]> {
    let Some((d, v, p)) = table_summaries(result) else {
        return Vec::new();
    };
    vec![
        [
            "Minimum".into(),
            format!("{:.2}", d.min),
            format!("{:.2}", v.min),
            format!("{:.3}", p.min),
        ],
        [
            "Maximum".into(),
            format!("{:.2}", d.max),
            format!("{:.2}", v.max),
            format!("{:.3}", p.max),
        ],
        [
            "Mean".into(),
            format!("{:.2}", d.mean),
            format!("{:.2}", v.mean),
            format!("{:.3}", p.mean),
        ],
        [
            "Median".into(),
            format!("{:.2}", d.median),
            format!("{:.2}", v.median),
            format!("{:.3}", p.median),
        ],
        [
            "Std dev".into(),
            format!("{:.2}", result.standard_deviation),
            format!("{:.2}", v.std_dev),
            format!("{:.3}", p.std_dev),
        ],
        [
            "Variance".into(),
            format!("{:.2}", result.variance),
            format!("{:.2}", v.variance),
            format!("{:.3}", p.variance),
        ],
    ]
}

fn padded_range(min: f64, max: f64) -> (f64, f64) {
    let pad = ((max - min) * 0.1).max(max.abs() * 0.1).max(1.0);
    (min - pad, max + pad)
}

fn generate_size_plot(path: &Path, result: &DistributionResult) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (1600, 900)).into_drawing_area();
    root.fill(&WHITE)?;

    let (d_min, d_max) = result.diameter_range();
    let mean = result.weighted_diameter_mean;
    let sd = result.standard_deviation;
    let (min_x, max_x) = padded_range(d_min.min(mean - sd), d_max.max(mean + sd));
    let max_y = result
        .samples
        .iter()
        .map(|s| s.normalized_weight)
        .fold(0.0, f64::max)
        * 1.15;

    let mut diameters: Vec<f64> = result.samples.iter().map(|s| s.diameter).collect();
    diameters.sort_by(|a, b| a.total_cmp(b));
    let min_gap = diameters
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 0.0)
        .fold(f64::INFINITY, f64::min);
    let bar_width = if min_gap.is_finite() {
        min_gap * 0.7
    } else {
        (max_x - min_x) * 0.05
    };

    let mut chart = ChartBuilder::on(&root)
        .caption("Particle Size Distribution", ("sans-serif", 48))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(min_x..max_x, 0.0..max_y)?;

    chart
        .configure_mesh()
        .x_desc("Diameter (nm)")
        .y_desc("% Volume")
        .label_style(("sans-serif", 28))
        .draw()?;

    let band = RED.mix(0.12);
    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(mean - sd, 0.0), (mean + sd, max_y)],
            band.filled(),
        )))?
        .label(format!("±1σ ({:.2} nm)", sd))
        .legend(move |(x, y)| Rectangle::new([(x, y - 8), (x + 20, y + 8)], band.filled()));

    let (r, g, b) = ACCENT;
    let bar_color = RGBColor(r, g, b);
    chart
        .draw_series(result.samples.iter().map(|s| {
            Rectangle::new(
                [
                    (s.diameter - bar_width / 2.0, 0.0),
                    (s.diameter + bar_width / 2.0, s.normalized_weight),
                ],
                bar_color.filled(),
            )
        }))?
        .label("% Volume")
        .legend(move |(x, y)| Rectangle::new([(x, y - 8), (x + 20, y + 8)], bar_color.filled()));

    chart
        .draw_series(LineSeries::new(
            vec![(mean, 0.0), (mean, max_y)],
            RED.stroke_width(4),
        ))?
        .label(format!("Mean: {:.2} nm", mean))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(&WHITE)
        .border_style(&BLACK)
        .label_font(("sans-serif", 28))
        .draw()?;

    root.present()?;
    Ok(())
}

fn generate_pdi_plot(path: &Path, result: &DistributionResult) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (1600, 900)).into_drawing_area();
    root.fill(&WHITE)?;

    let (d_min, d_max) = result.diameter_range();
    let (min_x, max_x) = padded_range(d_min, d_max);
    let max_pdi = result.samples.iter().map(|s| s.pdi).fold(0.0, f64::max);
    let max_y = (max_pdi * 1.2).max(0.05);
    let max_w = result
        .samples
        .iter()
        .map(|s| s.normalized_weight)
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut chart = ChartBuilder::on(&root)
        .caption("Diameter vs PDI", ("sans-serif", 48))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(min_x..max_x, 0.0..max_y)?;

    chart
        .configure_mesh()
        .x_desc("Diameter (nm)")
        .y_desc("PDI")
        .label_style(("sans-serif", 28))
        .draw()?;

    chart.draw_series(result.samples.iter().map(|s| {
        let t = s.normalized_weight / max_w;
        let color = volume_color(t);
        let radius = (8.0 + 32.0 * t) as i32;
        EmptyElement::at((s.diameter, s.pdi))
            + Circle::new((0, 0), radius, color.mix(0.8).filled())
            + Circle::new((0, 0), radius, RGBColor(47, 79, 79).stroke_width(3))
    }))?;

    root.present()?;
    Ok(())
}

/// Blue for low volume through to orange for the dominant fraction.
fn volume_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(lerp(52, 230), lerp(152, 126), lerp(219, 34))
}
