//! Named console styles.
//!
//! Style strings use the usual terminal vocabulary: colour names
//! (`cyan`, `bright_cyan`), `#rrggbb`, `rgb(r,g,b)`, `color(n)`, attributes
//! (`bold`, `dim`, `italic`, `underline`, `reverse`, `blink`, `strike`) and
//! `on <colour>` for the background. Unknown words are ignored.

use std::collections::{BTreeMap, HashMap};

use crossterm::style::{Attribute, Color, ContentStyle};

const DEFAULT_STYLES: &[(&str, &str)] = &[
    ("logging.time", "bright_cyan"),
    ("logging.level.debug", "green"),
    ("logging.level.info", "blue"),
    ("logging.level.warning", "yellow"),
    ("logging.level.error", "bold red"),
    ("logging.level.critical", "bold reverse red"),
    ("log.path", "dim"),
    ("traceback.title", "bold red"),
    ("traceback.path", "magenta"),
    ("traceback.lineno", "bright_cyan"),
    ("traceback.func", "green"),
    ("traceback.code", "dim"),
    ("traceback.exc_type", "bold red"),
    ("traceback.exc_value", ""),
];

/// Resolved styles by theme key.
#[derive(Debug, Clone)]
pub struct Theme {
    styles: HashMap<String, ContentStyle>,
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

impl Theme {
    /// Builds a theme from the defaults with `overrides` on top.
    pub fn new(overrides: &BTreeMap<String, String>) -> Self {
        let mut styles: HashMap<String, ContentStyle> = DEFAULT_STYLES
            .iter()
            .map(|(key, style)| (key.to_string(), parse_style(style)))
            .collect();
        for (key, style) in overrides {
            styles.insert(key.clone(), parse_style(style));
        }
        Self { styles }
    }

    /// Style for `key`, or an unstyled default.
    pub fn get(&self, key: &str) -> ContentStyle {
        self.styles.get(key).copied().unwrap_or_default()
    }

    /// Renders `text` in the style for `key`.
    pub fn paint(&self, key: &str, text: &str) -> String {
        let style = self.get(key);
        if style == ContentStyle::new() {
            return text.to_string();
        }
        style.apply(text).to_string()
    }
}

/// Splits on whitespace outside parentheses, so `rgb(1, 2, 3)` stays whole.
fn style_words(style: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in style.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Parses a style string into a crossterm style.
pub fn parse_style(style: &str) -> ContentStyle {
    let mut parsed = ContentStyle::new();
    let mut background = false;

    for word in style_words(&style.to_lowercase()) {
        if word == "on" {
            background = true;
            continue;
        }
        if let Some(color) = parse_color(&word) {
            if background {
                parsed.background_color = Some(color);
            } else {
                parsed.foreground_color = Some(color);
            }
            background = false;
            continue;
        }
        let attribute = match word.as_str() {
            "bold" | "b" => Attribute::Bold,
            "dim" | "d" => Attribute::Dim,
            "italic" | "i" => Attribute::Italic,
            "underline" | "u" => Attribute::Underlined,
            "reverse" | "r" => Attribute::Reverse,
            "blink" => Attribute::SlowBlink,
            "strike" | "s" => Attribute::CrossedOut,
            _ => continue,
        };
        parsed.attributes.set(attribute);
    }

    parsed
}

/// Parses a single colour word.
pub fn parse_color(word: &str) -> Option<Color> {
    let named = match word {
        "black" => Some(Color::Black),
        "red" => Some(Color::DarkRed),
        "green" => Some(Color::DarkGreen),
        "yellow" => Some(Color::DarkYellow),
        "blue" => Some(Color::DarkBlue),
        "magenta" => Some(Color::DarkMagenta),
        "cyan" => Some(Color::DarkCyan),
        "white" => Some(Color::Grey),
        "bright_black" | "grey" | "gray" => Some(Color::DarkGrey),
        "bright_red" => Some(Color::Red),
        "bright_green" => Some(Color::Green),
        "bright_yellow" => Some(Color::Yellow),
        "bright_blue" => Some(Color::Blue),
        "bright_magenta" => Some(Color::Magenta),
        "bright_cyan" => Some(Color::Cyan),
        "bright_white" => Some(Color::White),
        "default" => Some(Color::Reset),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    if let Some(hex) = word.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some(Color::Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        });
    }

    if let Some(args) = word.strip_prefix("rgb(").and_then(|w| w.strip_suffix(')')) {
        let parts: Vec<u8> = args
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .ok()?;
        if let [r, g, b] = parts[..] {
            return Some(Color::Rgb { r, g, b });
        }
        return None;
    }

    if let Some(index) = word.strip_prefix("color(").and_then(|w| w.strip_suffix(')')) {
        return index.trim().parse::<u8>().ok().map(Color::AnsiValue);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_colors() {
        assert_eq!(parse_color("cyan"), Some(Color::DarkCyan));
        assert_eq!(parse_color("bright_cyan"), Some(Color::Cyan));
        assert_eq!(parse_color("mauve"), None);
    }

    #[test]
    fn test_parse_hex_rgb_and_index() {
        assert_eq!(parse_color("#34d399"), Some(Color::Rgb { r: 0x34, g: 0xd3, b: 0x99 }));
        assert_eq!(parse_color("#34d39"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("rgb(52,211,153)"), Some(Color::Rgb { r: 52, g: 211, b: 153 }));
        assert_eq!(parse_color("rgb(1,2)"), None);
        assert_eq!(parse_color("rgb(1,2,300)"), None);
        assert_eq!(parse_color("color(118)"), Some(Color::AnsiValue(118)));
    }

    #[test]
    fn test_parse_style_with_attributes_and_background() {
        let style = parse_style("bold red on rgb(0, 0, 255)");
        assert_eq!(style.foreground_color, Some(Color::DarkRed));
        assert_eq!(style.background_color, Some(Color::Rgb { r: 0, g: 0, b: 255 }));
        assert!(style.attributes.has(Attribute::Bold));
        assert!(!style.attributes.has(Attribute::Italic));
    }

    #[test]
    fn test_parse_style_ignores_unknown_words() {
        let style = parse_style("sparkly BRIGHT_GREEN");
        assert_eq!(style.foreground_color, Some(Color::Green));
        assert_eq!(parse_style(""), ContentStyle::new());
    }

    #[test]
    fn test_theme_overrides_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("logging.time".to_string(), "magenta".to_string());
        overrides.insert("custom".to_string(), "italic".to_string());
        let theme = Theme::new(&overrides);

        assert_eq!(theme.get("logging.time").foreground_color, Some(Color::DarkMagenta));
        assert!(theme.get("custom").attributes.has(Attribute::Italic));
        assert_eq!(
            theme.get("logging.level.info").foreground_color,
            Some(Color::DarkBlue)
        );
        assert_eq!(theme.get("missing"), ContentStyle::new());
    }

    #[test]
    fn test_paint_unstyled_is_plain() {
        let theme = Theme::default();
        assert_eq!(theme.paint("traceback.exc_value", "boom"), "boom");
        assert_ne!(theme.paint("logging.level.error", "boom"), "boom");
        assert!(theme.paint("logging.level.error", "boom").contains("boom"));
    }
}
