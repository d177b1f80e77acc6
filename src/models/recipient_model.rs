//! models/recipient_model.rs
//! Destinatarios cargados desde CSV (columna `email` obligatoria, `name` opcional).

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SenderError, SenderResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: Option<&str>) -> Self {
        Recipient {
            email: email.into(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }
}

/// Lee el CSV del disco.
pub fn load_recipients(path: &Path) -> SenderResult<Vec<Recipient>> {
    let file = std::fs::File::open(path).map_err(|e| {
        SenderError::Input(format!("cannot open {}: {e}", path.display()))
    })?;
    parse_recipients(file)
}

/// Parsea destinatarios de cualquier lector CSV.
/// Los emails duplicados conservan la primera aparición.
pub fn parse_recipients<R: Read>(input: R) -> SenderResult<Vec<Recipient>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| SenderError::Input(format!("unreadable CSV header: {e}")))?
        .clone();

    let column = |wanted: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    };

    let email_idx = column("email")
        .ok_or_else(|| SenderError::Input("CSV must have an \"email\" column".to_string()))?;
    let name_idx = column("name");

    let mut seen = HashSet::new();
    let mut recipients = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| SenderError::Input(format!("malformed CSV row {}: {e}", line + 2)))?;

        let email = record.get(email_idx).unwrap_or("").trim();
        if email.is_empty() {
            return Err(SenderError::Input(format!(
                "row {} has an empty email",
                line + 2
            )));
        }

        if !seen.insert(email.to_string()) {
            log::debug!("Duplicated recipient {} ignored", email);
            continue;
        }

        let name = name_idx.and_then(|i| record.get(i));
        recipients.push(Recipient::new(email, name));
    }

    Ok(recipients)
}
