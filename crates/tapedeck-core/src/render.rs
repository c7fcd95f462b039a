use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::datetime::format_local;
use crate::project::{CellState, GridModel, ListRow};
use crate::tape::Tape;

const CELL_WIDTH: usize = 14;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, rows))]
    pub fn write_list<W: Write>(&self, out: W, rows: &[ListRow]) -> anyhow::Result<()> {
        let with_matches = rows.iter().any(|row| row.match_count.is_some());

        let mut headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Artist".to_string(),
            "Plays".to_string(),
        ];
        if with_matches {
            headers.push("Matches".to_string());
        }

        let table_rows = rows
            .iter()
            .map(|row| {
                let name = if row.out {
                    self.paint(&format!("[OUT] {}", row.name), "2")
                } else {
                    row.name.clone()
                };
                let mut cells = vec![
                    self.paint(&row.tape_id.to_string(), "33"),
                    name,
                    row.artist.clone(),
                    format!("{} PLAYS", row.plays),
                ];
                if with_matches {
                    cells.push(row.match_count.unwrap_or_default().to_string());
                }
                cells
            })
            .collect();

        write_table(out, headers, table_rows)
    }

    /// Draws the slot grid top row first, so the first line is `y = 11`.
    #[tracing::instrument(skip(self, out, grid))]
    pub fn write_grid<W: Write>(&self, mut out: W, grid: &GridModel) -> anyhow::Result<()> {
        write!(out, "{:>4} ", "")?;
        for x in 1..=tapedeck_shared::SLOT_COLUMNS {
            write!(out, "{:^width$} ", format!("x={x}"), width = CELL_WIDTH)?;
        }
        writeln!(out)?;

        for row in grid.rows() {
            let Some(first) = row.first() else {
                continue;
            };
            write!(out, "{:>4} ", format!("y={}", first.slot.y()))?;
            for cell in row {
                let (text, code) = match &cell.state {
                    CellState::Loaded { name, .. } => (format!("[{name}]"), "33"),
                    CellState::Out { name, .. } => (format!("({name})"), "2"),
                    CellState::Empty => ("+".to_string(), "32"),
                };
                let text = if cell.highlighted {
                    format!("*{text}")
                } else {
                    text
                };
                let fitted = fit_width(&text, CELL_WIDTH);
                let code = if cell.highlighted { "7" } else { code };
                write!(out, "{} ", self.paint(&fitted, code))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, tape), fields(id = tape.id))]
    pub fn write_tape<W: Write>(&self, mut out: W, tape: &Tape) -> anyhow::Result<()> {
        writeln!(out, "id        {}", tape.id)?;
        writeln!(out, "title     {}", tape.display_name())?;
        writeln!(out, "artist    {}", tape.display_artist())?;
        writeln!(out, "tags      {}", tape.tags_label())?;
        writeln!(out, "plays     {}", tape.listens)?;
        if let Some(last) = tape.last_played {
            writeln!(out, "played    {}", format_local(last))?;
        }
        match tape.slot {
            Some(slot) => writeln!(out, "slot      {slot}")?,
            None => writeln!(out, "slot      unassigned")?,
        }
        let status = if tape.in_machine {
            "in machine".to_string()
        } else {
            self.paint("OUT", "2")
        };
        writeln!(out, "status    {status}")?;
        writeln!(
            out,
            "action    {}",
            self.paint(tape.offered_action().label(), "1")
        )?;
        Ok(())
    }

    pub fn write_removal<'a, W, I>(&self, out: W, tapes: I) -> anyhow::Result<()>
    where
        W: Write,
        I: IntoIterator<Item = &'a Tape>,
    {
        let rows = tapes
            .into_iter()
            .map(|tape| {
                vec![
                    self.paint(&tape.id.to_string(), "33"),
                    crate::actions::RemovalPanel::label(tape),
                ]
            })
            .collect();
        write_table(out, vec!["ID".to_string(), "Cassette".to_string()], rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
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
        write!(writer, "{:-<width$} ", "", width = width)?;
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

/// Pads or truncates to exactly `width` terminal columns.
fn fit_width(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    let total = UnicodeWidthStr::width(text);

    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        let reserve = usize::from(total > width);
        if used + w + reserve > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    if total > width {
        out.push('…');
        used += 1;
    }
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
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

#[cfg(test)]
mod tests {
    use super::{Renderer, fit_width, strip_ansi};
    use crate::project::{project_grid, project_list};
    use crate::tape::{Slot, Tape};
    use crate::view::ViewState;

    #[test]
    fn fit_width_pads_and_truncates() {
        assert_eq!(fit_width("ab", 4), "ab  ");
        assert_eq!(fit_width("abcdef", 4), "abc…");
        assert_eq!(fit_width("abcd", 4), "abcd");
    }

    #[test]
    fn strip_ansi_drops_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[33m12\x1b[0m"), "12");
    }

    #[test]
    fn list_marks_out_tapes() {
        let mut out = Tape::new(1, "Harvest", false);
        out.listens = 3;
        let tapes = vec![out, Tape::new(2, "Blue", true)];
        let rows = project_list(&tapes, &ViewState::default());

        let mut buf = Vec::new();
        Renderer::plain().write_list(&mut buf, &rows).expect("render list");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("[OUT] Harvest"));
        assert!(lines[2].contains("3 PLAYS"));
        assert!(lines[3].contains("Blue"));
        assert!(!text.contains("Matches"));
    }

    #[test]
    fn grid_draws_top_row_as_y_eleven() {
        let mut top = Tape::new(1, "Top", true);
        top.slot = Slot::new(1, 11);
        let mut bottom = Tape::new(2, "Bottom", false);
        bottom.slot = Slot::new(5, 1);
        let grid = project_grid(&[top, bottom], "bot");

        let mut buf = Vec::new();
        Renderer::plain().write_grid(&mut buf, &grid).expect("render grid");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 12);
        assert!(lines[1].trim_start().starts_with("y=11 [Top]"));
        assert!(lines[11].contains("*(Bottom)"));
        assert_eq!(lines[5].matches('+').count(), 5);
    }

    #[test]
    fn detail_offers_single_action() {
        let tape = Tape::new(4, "Blue", false);
        let mut buf = Vec::new();
        Renderer::plain().write_tape(&mut buf, &tape).expect("render tape");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("action    RETURN"));
        assert!(!text.contains("DISPENSE"));
        assert!(text.contains("tags      No tags"));
        assert!(text.contains("slot      unassigned"));
    }
}
