use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable audit of a calculation, kept as data in the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationTrace {
    sections: Vec<TraceSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSection {
    pub title: String,
    pub lines: Vec<String>,
}

impl CalculationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new numbered section.
    pub fn section(&mut self, title: impl Into<String>) {
        self.sections.push(TraceSection {
            title: title.into(),
            lines: Vec::new(),
        });
    }

    /// Appends a line to the current section.
    pub fn line(&mut self, text: impl Into<String>) {
        if self.sections.is_empty() {
            self.section("Calculation");
        }
        if let Some(section) = self.sections.last_mut() {
            section.lines.push(text.into());
        }
    }

    pub fn sections(&self) -> &[TraceSection] {
        &self.sections
    }

    pub fn section_named(&self, title: &str) -> Option<&TraceSection> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().flat_map(|s| s.lines.iter().map(String::as_str))
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CalculationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, section) in self.sections.iter().enumerate() {
            writeln!(f, "{}. **{}**", index + 1, section.title)?;
            for line in &section.lines {
                writeln!(f, "    - {}", line)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
