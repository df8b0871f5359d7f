use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::analysis::AnalysisReport;
use crate::config::Config;
use crate::history::HistoryEntry;
use crate::projector::ProjectedTask;
use crate::task::Task;

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color_enabled(),
        }
    }

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_list(&mut self, tasks: &[ProjectedTask], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Title".to_string(),
            "Due".to_string(),
            "Effort".to_string(),
            "Tags".to_string(),
            "Subtasks".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for projected in tasks {
            let task = &projected.task;
            let due = due_label(task);
            let due = match task.due_date.to_naive_date() {
                Some(date) if date < today => self.paint(&due, "31"),
                _ => due,
            };
            let id = self.paint(short_id(&task.id), "33");
            let subtasks = projected
                .subtasks
                .iter()
                .map(|sub| sub.title.clone())
                .collect::<Vec<_>>()
                .join(", ");

            rows.push(vec![
                id,
                task.title.clone(),
                due,
                task.expected_effort(),
                tags_label(task),
                subtasks,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_history(&mut self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for entry in entries {
            writeln!(out, "{}", entry.line())?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, report))]
    pub fn print_report(&mut self, report: &AnalysisReport) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_report(&mut out, report)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn due_label(task: &Task) -> String {
    if let Some(date) = task.due_date.to_naive_date() {
        return date.format("%Y-%m-%d").to_string();
    }
    match task.due_date.sort_key() {
        Some((year, month, day)) => format!("{year}-{month:02}-{day:02}?"),
        None => String::new(),
    }
}

fn tags_label(task: &Task) -> String {
    task.selected_tags
        .iter()
        .map(|tag| {
            if tag.selected {
                format!("+{}", tag.text)
            } else {
                tag.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn write_report<W: Write>(mut writer: W, report: &AnalysisReport) -> anyhow::Result<()> {
    writeln!(writer, "Analysis for {}", report.reference_date.format("%Y-%m-%d"))?;

    writeln!(writer)?;
    writeln!(writer, "Completed Tasks")?;
    match report.completed {
        Some(counts) => write_table(
            &mut writer,
            vec!["Daily".into(), "Monthly".into(), "Yearly".into()],
            vec![vec![
                counts.day.to_string(),
                counts.month.to_string(),
                counts.year.to_string(),
            ]],
        )?,
        None => writeln!(writer, "unavailable")?,
    }

    writeln!(writer)?;
    writeln!(writer, "Most Productive Time")?;
    match report.productive {
        Some(times) => write_table(
            &mut writer,
            vec![
                "In Current Day".into(),
                "In Current Month".into(),
                "In Current Year".into(),
            ],
            vec![vec![times.hour_label(), times.day_label(), times.month_label()]],
        )?,
        None => writeln!(writer, "unavailable")?,
    }

    writeln!(writer)?;
    writeln!(writer, "Task Categories")?;
    match &report.categories {
        Some(rows) => write_table(
            &mut writer,
            vec!["Tag".into(), "Completed".into(), "Incomplete".into()],
            rows.iter()
                .map(|row| {
                    vec![
                        row.tag.clone(),
                        row.completed_count.to_string(),
                        row.incomplete_count.to_string(),
                    ]
                })
                .collect(),
        )?,
        None => writeln!(writer, "unavailable")?,
    }

    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
