//! SRT rendering and parsing.

use anyhow::{Context, Result, bail};

/// One SRT cue: timing plus text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Render cues as an SRT document: 1-based index, `HH:MM:SS,mmm` timing
/// line, text, blank separator.
pub fn render(cues: &[SrtCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        ));
    }
    out
}

/// Parse an SRT document. Indices are ignored; order is file order.
/// Multi-line cue text is joined with single spaces.
pub fn parse(content: &str) -> Result<Vec<SrtCue>> {
    let mut cues = Vec::new();
    // Blocks are separated by blank lines.
    for block in content.replace("\r\n", "\n").split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        if lines.len() < 2 {
            bail!("SRT block has no timing line: {block:?}");
        }
        // lines[0] is the index, lines[1] the timing, the rest the text.
        let timing = lines[1];
        let (start, end) = timing
            .split_once(" --> ")
            .with_context(|| format!("Malformed SRT timing line: {timing:?}"))?;
        cues.push(SrtCue {
            start_ms: parse_timestamp(start.trim())?,
            end_ms: parse_timestamp(end.trim())?,
            text: lines[2..].join(" "),
        });
    }
    Ok(cues)
}

fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

fn parse_timestamp(s: &str) -> Result<u64> {
    let (hms, millis) = s
        .split_once(',')
        .with_context(|| format!("SRT timestamp missing milliseconds: {s:?}"))?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        bail!("SRT timestamp is not HH:MM:SS,mmm: {s:?}");
    }
    let hours: u64 = parts[0].parse().with_context(|| format!("Bad hours in {s:?}"))?;
    let minutes: u64 = parts[1]
        .parse()
        .with_context(|| format!("Bad minutes in {s:?}"))?;
    let seconds: u64 = parts[2]
        .parse()
        .with_context(|| format!("Bad seconds in {s:?}"))?;
    let millis: u64 = millis
        .parse()
        .with_context(|| format!("Bad milliseconds in {s:?}"))?;
    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}
