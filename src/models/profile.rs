//! SUAP profile payloads and the field precedence table used to merge them.
//!
//! SUAP exposes the same person through two endpoints (`/api/eu` and
//! `/api/rh/meus-dados`) with overlapping, differently named fields. Which
//! endpoint wins for a given field is data, not code: [`ProfilePrecedence`]
//! holds an ordered candidate list per field and the first non-empty value wins.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::warn;

use super::user::ProfileFields;

/// Raw JSON object returned by one SUAP endpoint. Empty when the fetch failed.
pub type ProfilePayload = Map<String, Value>;

/// Which SUAP endpoint a candidate value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// `/api/eu`
    Eu,
    /// `/api/rh/meus-dados`
    MyData,
}

/// Local user attribute filled from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Matricula,
    Email,
    Nome,
    Campus,
    Foto,
    Sexo,
    TipoUsuario,
    Curso,
    Situacao,
    DataNascimento,
}

impl ProfileField {
    pub const ALL: [ProfileField; 10] = [
        Self::Matricula,
        Self::Email,
        Self::Nome,
        Self::Campus,
        Self::Foto,
        Self::Sexo,
        Self::TipoUsuario,
        Self::Curso,
        Self::Situacao,
        Self::DataNascimento,
    ];
}

/// One place to look for a field: an endpoint plus a dotted path (`vinculo.nome`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: ProfileSource,
    pub path: String,
}

impl Candidate {
    pub fn new(source: ProfileSource, path: &str) -> Self {
        Self {
            source,
            path: path.to_string(),
        }
    }
}

/// Both payloads fetched for one login.
#[derive(Debug, Clone, Default)]
pub struct ProviderProfiles {
    pub eu: ProfilePayload,
    pub my_data: ProfilePayload,
}

impl ProviderProfiles {
    fn payload(&self, source: ProfileSource) -> &ProfilePayload {
        match source {
            ProfileSource::Eu => &self.eu,
            ProfileSource::MyData => &self.my_data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.eu.is_empty() && self.my_data.is_empty()
    }
}

/// Result of a merge. `matricula` is `None` when no candidate supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedProfile {
    pub matricula: Option<String>,
    pub fields: ProfileFields,
}

/// Ordered candidate list per field; first non-empty value wins.
#[derive(Debug, Clone)]
pub struct ProfilePrecedence {
    rules: Vec<(ProfileField, Vec<Candidate>)>,
}

impl Default for ProfilePrecedence {
    fn default() -> Self {
        use ProfileField as F;
        use ProfileSource::{Eu, MyData};

        let rule = |field, candidates: &[(ProfileSource, &str)]| {
            (
                field,
                candidates
                    .iter()
                    .map(|(s, p)| Candidate::new(*s, p))
                    .collect::<Vec<_>>(),
            )
        };

        Self {
            rules: vec![
                rule(F::Matricula, &[(MyData, "matricula"), (Eu, "identificacao")]),
                rule(
                    F::Email,
                    &[(Eu, "email"), (Eu, "email_preferencial"), (MyData, "email")],
                ),
                rule(
                    F::Nome,
                    &[
                        (MyData, "vinculo.nome"),
                        (Eu, "nome_usual"),
                        (Eu, "nome"),
                        (MyData, "nome_usual"),
                    ],
                ),
                rule(F::Campus, &[(MyData, "vinculo.campus"), (Eu, "campus")]),
                rule(
                    F::Foto,
                    &[
                        (MyData, "url_foto_150x200"),
                        (Eu, "foto"),
                        (Eu, "url_foto_150x200"),
                    ],
                ),
                rule(F::Sexo, &[(Eu, "sexo"), (MyData, "sexo")]),
                rule(
                    F::TipoUsuario,
                    &[(MyData, "tipo_vinculo"), (Eu, "tipo_usuario")],
                ),
                rule(F::Curso, &[(MyData, "vinculo.curso")]),
                rule(F::Situacao, &[(MyData, "vinculo.situacao")]),
                rule(
                    F::DataNascimento,
                    &[(MyData, "data_nascimento"), (Eu, "data_de_nascimento")],
                ),
            ],
        }
    }
}

impl ProfilePrecedence {
    /// Replace the candidate list for one field.
    pub fn with_rule(mut self, field: ProfileField, candidates: Vec<Candidate>) -> Self {
        match self.rules.iter_mut().find(|(f, _)| *f == field) {
            Some((_, existing)) => *existing = candidates,
            None => self.rules.push((field, candidates)),
        }
        self
    }

    pub fn candidates(&self, field: ProfileField) -> &[Candidate] {
        self.rules
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, c)| c.as_slice())
            .unwrap_or(&[])
    }

    /// First non-empty value for `field` across its candidates.
    pub fn resolve(&self, field: ProfileField, profiles: &ProviderProfiles) -> Option<String> {
        self.candidates(field).iter().find_map(|c| {
            lookup_path(profiles.payload(c.source), &c.path).and_then(non_empty_string)
        })
    }

    /// Merge both payloads into local attributes.
    ///
    /// `nome` is required locally; when the provider supplies none the matricula
    /// stands in for it.
    pub fn merge(&self, profiles: &ProviderProfiles) -> MergedProfile {
        let get = |field| self.resolve(field, profiles);
        let matricula = get(ProfileField::Matricula);

        let data_nascimento = get(ProfileField::DataNascimento).and_then(|raw| {
            let parsed = parse_birth_date(&raw);
            if parsed.is_none() {
                warn!("SUAP: ignoring unparseable data_nascimento '{}'", raw);
            }
            parsed
        });

        let fields = ProfileFields {
            email: get(ProfileField::Email),
            nome: get(ProfileField::Nome)
                .or_else(|| matricula.clone())
                .unwrap_or_default(),
            campus: get(ProfileField::Campus),
            foto: get(ProfileField::Foto),
            sexo: get(ProfileField::Sexo),
            tipo_usuario: get(ProfileField::TipoUsuario),
            curso: get(ProfileField::Curso),
            situacao: get(ProfileField::Situacao),
            data_nascimento,
        };

        MergedProfile { matricula, fields }
    }
}

fn lookup_path<'a>(payload: &'a ProfilePayload, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(payload.get(first)?, |value, segment| value.get(segment))
}

fn non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// SUAP sends ISO dates; some deployments use the Brazilian format.
fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}
