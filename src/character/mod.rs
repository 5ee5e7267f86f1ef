//! Character phrase tables: (gender, age) pairs mapped to the descriptive
//! phrase that gets spliced into a style prompt.

pub mod random;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{StyleError, StyleResult};

pub use random::select_random;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    Female,
    Couple,
    Friends,
    Male,
}

impl Gender {
    pub const ALL: [Gender; 4] = [Gender::Female, Gender::Couple, Gender::Friends, Gender::Male];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> StyleResult<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            StyleError::InvalidArgument(format!("gender index {index} is out of range"))
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Couple => "Couple",
            Gender::Friends => "Friends",
            Gender::Male => "Male",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = StyleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|gender| gender.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| StyleError::InvalidArgument(format!("unknown gender '{trimmed}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Age {
    Young,
    Middle,
    Old,
}

impl Age {
    pub const ALL: [Age; 3] = [Age::Young, Age::Middle, Age::Old];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> StyleResult<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            StyleError::InvalidArgument(format!("age index {index} is out of range"))
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Age::Young => "Young",
            Age::Middle => "Middle",
            Age::Old => "Old",
        }
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Age {
    type Err = StyleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|age| age.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| StyleError::InvalidArgument(format!("unknown age '{trimmed}'")))
    }
}

/// 4x3 phrase table, rows follow [`Gender::ALL`] and columns [`Age::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterMatrix {
    cells: [[String; 3]; 4],
}

impl CharacterMatrix {
    /// Builds a matrix from nested rows, rejecting wrong shapes and blank cells.
    pub fn from_rows(rows: Vec<Vec<String>>) -> StyleResult<Self> {
        if rows.len() != Gender::ALL.len() {
            return Err(StyleError::Catalog(format!(
                "character matrix needs {} rows, got {}",
                Gender::ALL.len(),
                rows.len()
            )));
        }

        let mut cells: [[String; 3]; 4] = Default::default();
        for (gender, row) in Gender::ALL.into_iter().zip(rows) {
            if row.len() != Age::ALL.len() {
                return Err(StyleError::Catalog(format!(
                    "character matrix row '{gender}' needs {} columns, got {}",
                    Age::ALL.len(),
                    row.len()
                )));
            }
            for (age, phrase) in Age::ALL.into_iter().zip(row) {
                let phrase = phrase.trim().to_string();
                if phrase.is_empty() {
                    return Err(StyleError::Catalog(format!(
                        "character matrix cell ({gender}, {age}) is empty"
                    )));
                }
                cells[gender.index()][age.index()] = phrase;
            }
        }

        Ok(CharacterMatrix { cells })
    }

    pub fn get(&self, gender: Gender, age: Age) -> &str {
        &self.cells[gender.index()][age.index()]
    }
}

#[derive(Debug, Clone)]
pub struct Persona {
    name: String,
    matrix: CharacterMatrix,
}

impl Persona {
    pub fn new(name: impl Into<String>, matrix: CharacterMatrix) -> Self {
        Persona {
            name: name.into(),
            matrix,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, gender: Gender, age: Age) -> &str {
        let phrase = self.matrix.get(gender, age);
        debug!(
            target: "stylizer.prompt",
            "persona={} selection=({}, {}) phrase='{}'",
            self.name,
            age,
            gender,
            phrase
        );
        phrase
    }
}

/// Every persona known to the process, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PersonaBook {
    personas: BTreeMap<String, Persona>,
}

impl PersonaBook {
    pub fn insert(&mut self, persona: Persona) {
        self.personas.insert(persona.name().to_string(), persona);
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.personas.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    /// Fallible by name only; gender and age are closed enums.
    pub fn lookup(&self, persona: &str, gender: Gender, age: Age) -> StyleResult<&str> {
        self.get(persona)
            .map(|persona| persona.lookup(gender, age))
            .ok_or_else(|| StyleError::InvalidArgument(format!("unknown persona '{persona}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(prefix: &str) -> Vec<Vec<String>> {
        Gender::ALL
            .iter()
            .map(|gender| {
                Age::ALL
                    .iter()
                    .map(|age| format!("{prefix} {gender} {age}"))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn lookup_indexes_by_gender_row_and_age_column() {
        let matrix = CharacterMatrix::from_rows(rows("plain")).unwrap();
        let persona = Persona::new("plain", matrix);
        assert_eq!(persona.lookup(Gender::Couple, Age::Old), "plain Couple Old");
        assert_eq!(persona.lookup(Gender::Female, Age::Young), "plain Female Young");
        assert_eq!(persona.lookup(Gender::Male, Age::Middle), "plain Male Middle");
    }

    #[test]
    fn rejects_blank_cells_and_wrong_shapes() {
        let mut blank = rows("x");
        blank[2][1] = "   ".to_string();
        assert!(matches!(
            CharacterMatrix::from_rows(blank),
            Err(StyleError::Catalog(_))
        ));

        let mut short = rows("x");
        short.pop();
        assert!(CharacterMatrix::from_rows(short).is_err());

        let mut narrow = rows("x");
        narrow[0].pop();
        assert!(CharacterMatrix::from_rows(narrow).is_err());
    }

    #[test]
    fn parses_categories_case_insensitively() {
        assert_eq!("couple".parse::<Gender>().unwrap(), Gender::Couple);
        assert_eq!(" OLD ".parse::<Age>().unwrap(), Age::Old);
        assert_eq!("2".parse::<Gender>().unwrap(), Gender::Friends);
        assert!(matches!(
            "7".parse::<Age>(),
            Err(StyleError::InvalidArgument(_))
        ));
        assert!(matches!(
            "robot".parse::<Gender>(),
            Err(StyleError::InvalidArgument(_))
        ));
        assert!(matches!(
            "ancient".parse::<Age>(),
            Err(StyleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_range_indices_are_invalid_arguments() {
        assert_eq!(Gender::from_index(3).unwrap(), Gender::Male);
        assert!(matches!(
            Gender::from_index(4),
            Err(StyleError::InvalidArgument(_))
        ));
        assert!(matches!(
            Age::from_index(3),
            Err(StyleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_persona_name_fails() {
        let mut book = PersonaBook::default();
        book.insert(Persona::new(
            "plain",
            CharacterMatrix::from_rows(rows("plain")).unwrap(),
        ));
        assert!(book.lookup("plain", Gender::Friends, Age::Young).is_ok());
        assert!(book.lookup("missing", Gender::Friends, Age::Young).is_err());
    }
}
