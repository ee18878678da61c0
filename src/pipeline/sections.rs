//! Section builder — folds the ordered element stream into heading-anchored
//! sections, rendering tables and code blocks either as preserved standalone
//! sections or as flattened text.

use crate::core::model::{CodeBlockData, Element, Section, SectionKind, TableData};

pub struct SectionOptions {
    pub preserve_tables: bool,
    pub preserve_code: bool,
}

impl Default for SectionOptions {
    fn default() -> Self {
        Self {
            preserve_tables: true,
            preserve_code: true,
        }
    }
}

struct SectionBuilder {
    sections: Vec<Section>,
    current_text: String,
    current_heading: Option<String>,
    /// Heading texts indexed by level − 1; a level-N heading truncates
    /// everything at index ≥ N − 1 before writing its own slot.
    heading_stack: Vec<String>,
}

impl SectionBuilder {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            current_text: String::new(),
            current_heading: None,
            heading_stack: Vec::new(),
        }
    }

    fn heading_path(&self) -> Vec<String> {
        self.heading_stack.clone()
    }

    fn append_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.current_text.is_empty() {
            self.current_text.push_str("\n\n");
        }
        self.current_text.push_str(text.trim_end());
    }

    fn flush_text(&mut self) {
        if self.current_text.trim().is_empty() {
            self.current_text.clear();
            return;
        }
        let text = std::mem::take(&mut self.current_text);
        self.sections.push(Section {
            text,
            kind: SectionKind::Text,
            heading: self.current_heading.clone(),
            heading_path: self.heading_path(),
            table_data: None,
            code_block: None,
        });
    }

    fn on_heading(&mut self, level: u8, text: &str) {
        self.flush_text();
        let level = level.clamp(1, 6) as usize;
        self.heading_stack.truncate(level - 1);
        while self.heading_stack.len() < level - 1 {
            self.heading_stack.push(String::new());
        }
        self.heading_stack.push(text.to_string());
        self.current_heading = Some(text.to_string());
        // The heading doubles as the first line of its section's text.
        self.current_text = text.to_string();
    }

    fn emit_table(&mut self, data: &TableData) {
        self.flush_text();
        self.sections.push(Section {
            text: render_table(data),
            kind: SectionKind::Table,
            heading: self.current_heading.clone(),
            heading_path: self.heading_path(),
            table_data: Some(data.clone()),
            code_block: None,
        });
    }

    fn emit_code(&mut self, language: Option<&str>, text: &str, line_count: usize) {
        self.flush_text();
        let block = CodeBlockData {
            language: language.map(|s| s.to_string()),
            text: text.to_string(),
            line_count,
        };
        self.sections.push(Section {
            text: render_code(language, text),
            kind: SectionKind::Code,
            heading: self.current_heading.clone(),
            heading_path: self.heading_path(),
            table_data: None,
            code_block: Some(block),
        });
    }
}

/// Pipe-delimited rendering: optional caption line, headers, divider, rows.
pub fn render_table(data: &TableData) -> String {
    let mut lines = Vec::new();
    if let Some(caption) = &data.caption {
        if !caption.trim().is_empty() {
            lines.push(format!("Table: {}", caption.trim()));
        }
    }
    if let Some(headers) = &data.headers {
        lines.push(format!("| {} |", headers.join(" | ")));
        lines.push(format!(
            "| {} |",
            headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
        ));
    }
    for row in &data.rows {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    lines.join("\n")
}

pub fn render_code(language: Option<&str>, body: &str) -> String {
    match language {
        Some(lang) if !lang.is_empty() => format!("Code ({}):\n{}", lang, body),
        _ => format!("Code:\n{}", body),
    }
}

/// Fold elements into sections. Text-like elements accumulate under the
/// current heading; tables and code either become standalone sections
/// (preservation on) or flatten into the running text.
pub fn sectionize(elements: &[Element], opts: &SectionOptions) -> Vec<Section> {
    let mut b = SectionBuilder::new();

    for element in elements {
        match element {
            Element::Heading { level, text } => b.on_heading(*level, text),
            Element::Paragraph { text } => b.append_text(text),
            Element::List { items, ordered: _ } => {
                let rendered = items
                    .iter()
                    .map(|i| format!("• {}", i))
                    .collect::<Vec<_>>()
                    .join("\n");
                b.append_text(&rendered);
            }
            Element::Blockquote { text } => {
                let quoted = text
                    .lines()
                    .map(|l| format!("> {}", l))
                    .collect::<Vec<_>>()
                    .join("\n");
                b.append_text(&quoted);
            }
            Element::Table { data } => {
                if opts.preserve_tables {
                    b.emit_table(data);
                } else {
                    b.append_text(&render_table(data));
                }
            }
            Element::Code {
                language,
                text,
                line_count,
            } => {
                if opts.preserve_code {
                    b.emit_code(language.as_deref(), text, *line_count);
                } else {
                    b.append_text(&render_code(language.as_deref(), text));
                }
            }
            Element::Media { .. } => {}
        }
    }

    b.flush_text();
    b.sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::MediaKind;

    fn h(level: u8, text: &str) -> Element {
        Element::Heading {
            level,
            text: text.into(),
        }
    }

    fn p(text: &str) -> Element {
        Element::Paragraph { text: text.into() }
    }

    #[test]
    fn heading_starts_section_and_is_first_line() {
        let sections = sectionize(
            &[h(1, "Title"), p("AAA BBB.")],
            &SectionOptions::default(),
        );
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text, "Title\n\nAAA BBB.");
        assert_eq!(sections[0].heading.as_deref(), Some("Title"));
        assert_eq!(sections[0].heading_path, vec!["Title"]);
    }

    #[test]
    fn heading_stack_truncates_on_shallower_heading() {
        let sections = sectionize(
            &[
                h(1, "Guide"),
                p("intro"),
                h(2, "Install"),
                p("steps"),
                h(3, "Linux"),
                p("apt"),
                h(2, "Usage"),
                p("run it"),
            ],
            &SectionOptions::default(),
        );
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[2].heading_path, vec!["Guide", "Install", "Linux"]);
        // The level-2 "Usage" replaced "Install" and dropped "Linux".
        assert_eq!(sections[3].heading_path, vec!["Guide", "Usage"]);
    }

    #[test]
    fn lists_and_quotes_render_into_text() {
        let sections = sectionize(
            &[
                p("Before."),
                Element::List {
                    ordered: false,
                    items: vec!["one".into(), "two".into()],
                },
                Element::Blockquote {
                    text: "wise words".into(),
                },
            ],
            &SectionOptions::default(),
        );
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("• one\n• two"));
        assert!(sections[0].text.contains("> wise words"));
    }

    #[test]
    fn preserved_table_is_own_section() {
        let table = TableData {
            headers: Some(vec!["Name".into(), "Age".into()]),
            rows: vec![
                vec!["Ada".into(), "36".into()],
                vec!["Alan".into(), "41".into()],
            ],
            caption: Some("People".into()),
            cell_images: vec![],
        };
        let sections = sectionize(
            &[p("Intro."), Element::Table { data: table }, p("Outro.")],
            &SectionOptions::default(),
        );
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].kind, SectionKind::Table);
        assert!(sections[1].text.starts_with("Table: People\n| Name | Age |"));
        assert!(sections[1].text.contains("| --- | --- |"));
        assert_eq!(sections[1].table_data.as_ref().unwrap().rows.len(), 2);
    }

    #[test]
    fn unpreserved_code_flattens() {
        let sections = sectionize(
            &[
                p("Look:"),
                Element::Code {
                    language: Some("rust".into()),
                    text: "fn main() {}".into(),
                    line_count: 0,
                },
            ],
            &SectionOptions {
                preserve_tables: true,
                preserve_code: false,
            },
        );
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("Code (rust):\nfn main() {}"));
    }

    #[test]
    fn media_contributes_nothing() {
        let sections = sectionize(
            &[Element::Media {
                kind: MediaKind::Image,
                src: "https://example.com/x.png".into(),
                alt: None,
                context: None,
            }],
            &SectionOptions::default(),
        );
        assert!(sections.is_empty());
    }
}
