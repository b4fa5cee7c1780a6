//! Class-name codec: the display name of a class is derived from its
//! grade level and a section letter (`"3B"`, `"RA"`). Grade level 0 is
//! the reception year and renders as "R". Everything here is pure;
//! handlers do the lookups and feed rows in.

/// Valid section letters, in display order.
pub const SECTION_LETTERS: [char; 6] = ['A', 'B', 'C', 'D', 'E', 'F'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassName {
    pub grade_level: i64,
    pub letter: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub input: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a valid class name: {:?}", self.input)
    }
}

pub fn is_section_letter(c: char) -> bool {
    SECTION_LETTERS.contains(&c.to_ascii_uppercase())
}

/// `encode(0, 'B') == "RB"`, `encode(10, 'A') == "10A"`.
/// Callers validate the letter first (`is_section_letter`).
pub fn encode(grade_level: i64, letter: char) -> String {
    let letter = letter.to_ascii_uppercase();
    if grade_level == 0 {
        format!("R{}", letter)
    } else {
        format!("{}{}", grade_level, letter)
    }
}

/// Inverse of `encode`, case-insensitive. Accepts `R` or one/two digits
/// followed by a section letter; anything else (legacy or hand-edited
/// names) is a `ParseError` and the caller decides the fallback.
pub fn decode(name: &str) -> Result<ClassName, ParseError> {
    let fail = || ParseError {
        input: name.to_string(),
    };

    let upper = name.trim().to_ascii_uppercase();
    let mut chars = upper.chars();
    let letter = chars.next_back().ok_or_else(fail)?;
    if !is_section_letter(letter) {
        return Err(fail());
    }

    let head: String = chars.collect();
    let grade_level = if head == "R" {
        0
    } else if (1..=2).contains(&head.len()) && head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse::<i64>().map_err(|_| fail())?
    } else {
        return Err(fail());
    };

    Ok(ClassName {
        grade_level,
        letter,
    })
}

/// What the validator needs to know about each candidate class.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    pub enrolled: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignable {
    Found { class_id: String },
    /// No class carries the encoded name; this flow never auto-creates.
    NotFound,
    CapacityFull { class_id: String },
}

/// Looks up the class whose name equals `encode(grade_level, letter)`.
/// Capacity is checked only when `enforce_capacity` is set: new-student
/// assignment is gated, other class-selection flows are not.
pub fn validate_assignable(
    grade_level: i64,
    letter: char,
    classes: &[ClassRecord],
    enforce_capacity: bool,
) -> Assignable {
    let wanted = encode(grade_level, letter);
    let Some(class) = classes.iter().find(|c| c.name == wanted) else {
        return Assignable::NotFound;
    };
    if enforce_capacity && class.enrolled >= class.capacity {
        return Assignable::CapacityFull {
            class_id: class.id.clone(),
        };
    }
    Assignable::Found {
        class_id: class.id.clone(),
    }
}
