//! `${TAG}` markup resolution.

use colored::{Color, Colorize};

/// Style selected by the most recent markup tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Bold,
    BoldGreen,
    Gray,
    BoldMagenta,
    Rainbow,
}

impl Style {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "RESET" => Some(Self::Plain),
            "BOLD" => Some(Self::Bold),
            "BOLD_GREEN" => Some(Self::BoldGreen),
            "GRAY" => Some(Self::Gray),
            "BOLD_MAGENTA" => Some(Self::BoldMagenta),
            "RAINBOW" => Some(Self::Rainbow),
            _ => None,
        }
    }
}

/// Render a markup template line.
///
/// With `use_color` off the tags are stripped and the text passes
/// through untouched. Unknown tags are kept literally.
pub fn render_markup(line: &str, use_color: bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut style = Style::Plain;
    let mut rest = line;

    while let Some(start) = rest.find("${") {
        push_styled(&mut out, &rest[..start], style, use_color);
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            // Unterminated tag, keep it literally.
            push_styled(&mut out, after, style, use_color);
            return out;
        };
        match Style::from_tag(&after[2..end]) {
            Some(next) => style = next,
            None => push_styled(&mut out, &after[..=end], style, use_color),
        }
        rest = &after[end + 1..];
    }
    push_styled(&mut out, rest, style, use_color);
    out
}

fn push_styled(out: &mut String, text: &str, style: Style, use_color: bool) {
    if text.is_empty() {
        return;
    }
    if !use_color {
        out.push_str(text);
        return;
    }
    match style {
        Style::Plain => out.push_str(text),
        Style::Bold => out.push_str(&text.bold().to_string()),
        Style::BoldGreen => out.push_str(&text.green().bold().to_string()),
        Style::Gray => out.push_str(&text.bright_black().to_string()),
        Style::BoldMagenta => out.push_str(&text.bright_magenta().bold().to_string()),
        Style::Rainbow => out.push_str(&rainbow(text)),
    }
}

const RAINBOW_COLORS: [Color; 6] = [
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Cyan,
    Color::Blue,
    Color::Magenta,
];

/// Color text character by character through a fixed palette.
///
/// Whitespace stays uncolored and does not advance the palette.
pub fn rainbow(text: &str) -> String {
    let mut out = String::new();
    let mut index = 0;
    for ch in text.chars() {
        if ch.is_whitespace() {
            out.push(ch);
            continue;
        }
        let colored = ch
            .to_string()
            .color(RAINBOW_COLORS[index % RAINBOW_COLORS.len()])
            .bold();
        out.push_str(&colored.to_string());
        index += 1;
    }
    out
}
