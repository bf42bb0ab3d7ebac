use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::config::SubtitleConfig;
use crate::error::{Result, SubburnError};
use crate::media::MediaEncoder;

/// Output path of the overlaid chunk: `<stem>_subtitled.<ext>` beside the input
pub fn subtitled_path_for(chunk_path: &Path) -> PathBuf {
    with_suffix(chunk_path, "_subtitled", None)
}

fn caption_path_for(chunk_path: &Path) -> PathBuf {
    with_suffix(chunk_path, "_caption", Some("txt"))
}

fn with_suffix(path: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let extension = extension
        .map(str::to_string)
        .or_else(|| path.extension().map(|e| e.to_string_lossy().to_string()));

    let name = match extension {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Estimated advance of a glyph in ems. Rounded up against common sans
/// fonts so that a wrapped line never outgrows the frame.
fn glyph_width(c: char) -> f64 {
    match c {
        ' ' | 'i' | 'j' | 'l' | '.' | ',' | '\'' | '!' | '|' | ':' | ';' => 0.35,
        'f' | 'r' | 't' | 'I' => 0.5,
        'M' | 'W' | 'm' | 'w' | '@' | '%' => 1.0,
        c if c.is_ascii_uppercase() || c.is_ascii_digit() => 0.8,
        c if c.is_ascii() => 0.65,
        _ => 1.0,
    }
}

/// Estimated width of `text` in ems
pub fn text_width(text: &str) -> f64 {
    text.chars().map(glyph_width).sum()
}

/// Width in ems available to one caption line of a `width` pixel frame
pub fn line_width_budget(width: u32, style: &SubtitleConfig) -> f64 {
    let usable = width.saturating_sub(2 * (style.box_border + style.bottom_margin)) as f64;
    usable / style.font_size as f64
}

/// Greedy word wrap against an em budget. Words wider than a line are broken.
pub fn wrap_caption(text: &str, max_width: f64) -> Vec<String> {
    let space = glyph_width(' ');
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        for piece in split_to_width(word, max_width) {
            let piece_width = text_width(&piece);
            if !current.is_empty() && current_width + space + piece_width > max_width {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_width += space;
            }
            current.push_str(&piece);
            current_width += piece_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn split_to_width(word: &str, max_width: f64) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut width = 0.0;

    for c in word.chars() {
        let w = glyph_width(c);
        // A single glyph always gets a line of its own, even on a tiny frame
        if !piece.is_empty() && width + w > max_width {
            pieces.push(std::mem::take(&mut piece));
            width = 0.0;
        }
        piece.push(c);
        width += w;
    }

    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Escape a value for a filter option inside a filtergraph (both levels)
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

/// drawtext filter for a caption read from `caption_file`: bottom centered,
/// on a bordered box, for the whole clip
pub fn caption_filter(caption_file: &Path, style: &SubtitleConfig) -> String {
    let mut filter = format!(
        "drawtext=textfile={}:expansion=none:fontsize={}:fontcolor={}:box=1:boxcolor={}:boxborderw={}:line_spacing=4:x=(w-text_w)/2:y=h-text_h-{}",
        escape_filter_value(&caption_file.to_string_lossy()),
        style.font_size,
        escape_filter_value(&style.font_color),
        escape_filter_value(&style.box_color),
        style.box_border,
        style.bottom_margin + style.box_border,
    );

    if style.center_lines {
        filter.push_str(":text_align=C");
    }
    if let Some(font_file) = &style.font_file {
        filter.push_str(&format!(":fontfile={}", escape_filter_value(&font_file.to_string_lossy())));
    }
    filter
}

/// Burns translated text into video chunks
pub struct SubtitleRenderer {
    encoder: Arc<dyn MediaEncoder>,
    style: SubtitleConfig,
}

impl SubtitleRenderer {
    pub fn new(encoder: Arc<dyn MediaEncoder>, style: SubtitleConfig) -> Self {
        Self { encoder, style }
    }

    /// Whether `text` gets an overlay at all
    pub fn needs_overlay(&self, text: &str) -> bool {
        !(self.style.skip_empty && text.trim().is_empty())
    }

    /// Burn `text` into `chunk_path` and return the new chunk's path.
    ///
    /// When the text is empty and `skip_empty` is set, the chunk is returned
    /// unchanged.
    pub async fn render_subtitles(&self, chunk_path: &Path, text: &str) -> Result<PathBuf> {
        if !self.needs_overlay(text) {
            debug!("No speech in {}, skipping overlay", chunk_path.display());
            return Ok(chunk_path.to_path_buf());
        }

        let media = self
            .encoder
            .probe(chunk_path)
            .await
            .map_err(|e| e.into_stage(SubburnError::Render))?;
        let width = media.video_width()?;

        let lines = wrap_caption(text, line_width_budget(width, &self.style));
        let caption_file = caption_path_for(chunk_path);
        fs::write(&caption_file, lines.join("\n"))
            .await
            .map_err(|e| SubburnError::Render(format!("Failed to write caption: {}", e)))?;

        let output_path = subtitled_path_for(chunk_path);
        let filter = caption_filter(&caption_file, &self.style);

        info!(
            "Rendering {} caption lines into {}",
            lines.len(),
            output_path.display()
        );

        self.encoder
            .filter_video(chunk_path, &filter, &output_path)
            .await
            .map_err(|e| e.into_stage(SubburnError::Render))?;

        if !output_path.is_file() {
            return Err(SubburnError::Render(format!(
                "no output written to {}",
                output_path.display()
            )));
        }

        Ok(output_path)
    }
}
