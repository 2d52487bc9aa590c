use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Edits {first} and {second} overlap")]
    Overlap { first: Edit, second: Edit },
    #[error("{edit} does not fit a text of {len} bytes")]
    OutOfRange { edit: Edit, len: usize },
}

// Replaces the bytes `start..end` of a specific base string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Display for Edit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}] -> {:?}", self.start, self.end, self.replacement)
    }
}

impl Edit {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Edit {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    fn check(&self, text: &str) -> Result<(), EditError> {
        let fits = self.start <= self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end);
        if fits {
            Ok(())
        } else {
            Err(EditError::OutOfRange {
                edit: self.clone(),
                len: text.len(),
            })
        }
    }

    pub fn apply(&self, text: &str) -> Result<String, EditError> {
        self.check(text)?;
        let mut result = String::with_capacity(text.len() - (self.end - self.start) + self.replacement.len());
        result.push_str(&text[..self.start]);
        result.push_str(&self.replacement);
        result.push_str(&text[self.end..]);
        Ok(result)
    }

    // The edit that undoes this one, expressed over the text this edit
    // produces from `base`.
    pub fn reverse(&self, base: &str) -> Result<Edit, EditError> {
        self.check(base)?;
        Ok(Edit {
            start: self.start,
            end: self.start + self.replacement.len(),
            replacement: base[self.start..self.end].to_string(),
        })
    }

    // Re-expresses `other`, an edit over the same base as this one, over the
    // text produced once this edit is applied.
    pub fn shift_other(&self, other: &Edit) -> Result<Edit, EditError> {
        if other.end <= self.start && other.start < self.start {
            return Ok(other.clone());
        }

        if other.start >= self.end {
            let removed = self.end - self.start;
            let inserted = self.replacement.len();
            return Ok(Edit {
                start: other.start + inserted - removed,
                end: other.end + inserted - removed,
                replacement: other.replacement.clone(),
            });
        }

        Err(EditError::Overlap {
            first: self.clone(),
            second: other.clone(),
        })
    }

    // `base` with a caret line under the replaced span.
    pub fn pretty(&self, base: &str) -> String {
        let indent = base.get(..self.start).map_or(self.start, |prefix| prefix.chars().count());
        let width = base.get(self.start..self.end).map_or(0, |span| span.chars().count());
        format!("{}\n{}{} --> {}", base, " ".repeat(indent), "^".repeat(width), self.replacement)
    }
}
