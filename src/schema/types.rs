/// Entity catalogue for the research organization data model
///
/// Every table the service knows about is described here once, as data: its storage
/// name, URL slug, the fields clients may submit and the columns they land in.
/// Storage backends, validation and the HTTP layer are all driven by this catalogue.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored row: integer `id` plus upper-case column keys, exactly as it appears
/// in the JSON document backend.
pub type Record = Map<String, Value>;

/// Column holding the record identifier in every table
pub const ID_COLUMN: &str = "id";

/// Server-managed columns (never accepted from a generic payload)
pub const PASSWORD_HASH_COLUMN: &str = "PASSWORD_HASH";
pub const ACTIVE_COLUMN: &str = "ACTIVE";
pub const IMAGE_COLUMN: &str = "IMAGE";

/// Extract the identifier of a stored record
pub fn record_id(record: &Record) -> Option<i64> {
    record.get(ID_COLUMN).and_then(Value::as_i64)
}

/// Value shape of a single field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Free text
    Text,
    /// Free text with a maximum length in characters
    LongText { max: usize },
    /// Any integer
    Integer,
    /// Integer strictly greater than zero (identifiers)
    PositiveInteger,
    /// Floating point number with an optional lower bound
    Real { min: Option<f64> },
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// Time of day, `HH:MM`
    Time,
    /// `local@domain.tld`
    Email,
    /// Digits only, at least seven of them
    Phone,
    /// Absolute http(s) URL
    Url,
    /// true / false
    Boolean,
}

impl FieldKind {
    /// SQLite column affinity for this kind
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Integer | FieldKind::PositiveInteger | FieldKind::Boolean => "INTEGER",
            FieldKind::Real { .. } => "REAL",
            _ => "TEXT",
        }
    }
}

/// One client-facing field and the column it is stored in
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name used in request payloads (e.g. "name_project")
    pub input: &'static str,
    /// Name of the stored column (e.g. "NAME_PROJECT")
    pub column: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Table whose `id` this field must point at
    pub references: Option<EntityKind>,
}

const fn field(input: &'static str, column: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        input,
        column,
        kind,
        required: false,
        references: None,
    }
}

impl FieldSpec {
    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn references(mut self, target: EntityKind) -> Self {
        self.references = Some(target);
        self
    }
}

const NON_NEGATIVE: FieldKind = FieldKind::Real { min: Some(0.0) };

const GRADE_FIELDS: &[FieldSpec] = &[field("name_grade", "NAME_GRADE", FieldKind::Text).required()];

const LABORATORY_FIELDS: &[FieldSpec] = &[
    field("name_lab", "NAME_LAB", FieldKind::Text).required(),
    field("director", "DIRECTOR", FieldKind::PositiveInteger).references(EntityKind::Researcher),
];

const RESEARCHER_FIELDS: &[FieldSpec] = &[
    field("full_name", "FULL_NAME", FieldKind::Text).required(),
    field("id_grade", "ID_GRADE", FieldKind::PositiveInteger).references(EntityKind::Grade),
    field("num_tel", "NUM_TEL", FieldKind::Phone),
    field("email", "EMAIL", FieldKind::Email),
    field("position", "POSITION", FieldKind::Text),
    field("bio", "BIO", FieldKind::LongText { max: 2000 }),
];

const PROJECT_FIELDS: &[FieldSpec] = &[
    field("name_project", "NAME_PROJECT", FieldKind::Text).required(),
    field("id_manager", "ID_MANAGER", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Researcher),
    field("state", "STATUS", FieldKind::Text).required(),
    field("budget", "BUDGET", NON_NEGATIVE).required(),
    field("date_begin", "DATE_BEGIN", FieldKind::Date).required(),
    field("date_end", "DATE_END", FieldKind::Date).required(),
];

const PARTNER_FIELDS: &[FieldSpec] = &[
    field("name_partner", "NAME_PARTNER", FieldKind::Text).required(),
    field("email_partner", "EMAIL_PARTNER", FieldKind::Email).required(),
    field("phone", "PHONE", FieldKind::Phone).required(),
    field("address", "ADDRESS", FieldKind::Text).required(),
    field("creation_date", "CREATION_DATE", FieldKind::Date).required(),
    field("website", "WEBSITE", FieldKind::Url),
    field("notes", "NOTES", FieldKind::LongText { max: 500 }),
    field("amount", "AMOUNT", NON_NEGATIVE).required(),
];

const EQUIPMENT_FIELDS: &[FieldSpec] = &[
    field("name_equipment", "NAME_EQUIPMENT", FieldKind::Text).required(),
    field("purchase_date", "PURCHASE_DATE", FieldKind::Date).required(),
    field("laboratory_id", "LABORATORY_ID", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Laboratory),
];

const EVENT_TYPE_FIELDS: &[FieldSpec] = &[
    field("name_type", "NAME_TYPE", FieldKind::Text).required(),
    field("description", "DESCRIPTION", FieldKind::LongText { max: 500 }),
];

const EVENT_FIELDS: &[FieldSpec] = &[
    field("name_event", "NAME_EVENT", FieldKind::Text).required(),
    field("type_event", "TYPE_EVENT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::EventType),
    field("id_organisor", "ID_ORGANISOR", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Researcher),
    field("date_begin", "DATE_BEGIN", FieldKind::Date).required(),
    field("hour", "HOUR", FieldKind::Time).required(),
    field("date_end", "DATE_END", FieldKind::Date).required(),
    field("place", "PLACE", FieldKind::Text).required(),
];

const PUBLICATION_FIELDS: &[FieldSpec] = &[
    field("title", "TITLE", FieldKind::Text).required(),
    field("id_researcher", "ID_RESEARCHER", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Researcher),
    field("description", "DESCRIPTION", FieldKind::LongText { max: 5000 }).required(),
    field("date", "DATE_PUB", FieldKind::Date).required(),
    field("link", "LINK", FieldKind::Url),
];

const ASSIGN_FIELDS: &[FieldSpec] = &[
    field("labo_id", "LABO_ID", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Laboratory),
    field("id_project", "ID_PROJECT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Project),
];

const WORK_FIELDS: &[FieldSpec] = &[
    field("id_project", "ID_PROJECT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Project),
    field("id_researcher", "ID_RESEARCHER", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Researcher),
];

const PARTICIPATE_FIELDS: &[FieldSpec] = &[
    field("id_event", "ID_EVENT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Event),
    field("id_researcher", "ID_RESEARCHER", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Researcher),
];

const COLLABORATE_FIELDS: &[FieldSpec] = &[
    field("id_partner", "ID_PARTNER", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Partner),
    field("id_project", "ID_PROJECT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Project),
];

const RESERVE_FIELDS: &[FieldSpec] = &[
    field("id_project", "ID_PROJECT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Project),
    field("id_equipment", "ID_EQUIPMENT", FieldKind::PositiveInteger)
        .required()
        .references(EntityKind::Equipment),
    field("start_date", "START_DATE", FieldKind::Date).required(),
    field("end_date", "END_DATE", FieldKind::Date).required(),
];

const RESEARCHER_MANAGED: &[(&str, FieldKind)] = &[
    (PASSWORD_HASH_COLUMN, FieldKind::Text),
    (ACTIVE_COLUMN, FieldKind::Boolean),
    (IMAGE_COLUMN, FieldKind::Text),
];

const IMAGE_MANAGED: &[(&str, FieldKind)] = &[(IMAGE_COLUMN, FieldKind::Text)];

/// Every table of the data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Grade,
    Laboratory,
    Researcher,
    Project,
    Partner,
    Equipment,
    EventType,
    Event,
    Publication,
    /// Laboratory <-> Project
    Assign,
    /// Project <-> Researcher
    Work,
    /// Event <-> Researcher
    Participate,
    /// Partner <-> Project
    Collaborate,
    /// Project <-> Equipment, with a booking period
    Reserve,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Grade,
        EntityKind::Laboratory,
        EntityKind::Researcher,
        EntityKind::Project,
        EntityKind::Partner,
        EntityKind::Equipment,
        EntityKind::EventType,
        EntityKind::Event,
        EntityKind::Publication,
        EntityKind::Assign,
        EntityKind::Work,
        EntityKind::Participate,
        EntityKind::Collaborate,
        EntityKind::Reserve,
    ];

    /// Storage table name
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Grade => "GRADE",
            EntityKind::Laboratory => "LABORATORY",
            EntityKind::Researcher => "RESEARCHER",
            EntityKind::Project => "PROJECT",
            EntityKind::Partner => "PARTNER",
            EntityKind::Equipment => "EQUIPMENT",
            EntityKind::EventType => "TYPE_EV",
            EntityKind::Event => "EVENT",
            EntityKind::Publication => "PUBLICATION",
            EntityKind::Assign => "ASSIGN",
            EntityKind::Work => "WORK",
            EntityKind::Participate => "PARTICIPATE",
            EntityKind::Collaborate => "COLLABORATE",
            EntityKind::Reserve => "RESERVE",
        }
    }

    /// URL path segment under `/api`
    pub fn slug(self) -> &'static str {
        match self {
            EntityKind::Grade => "grades",
            EntityKind::Laboratory => "laboratories",
            EntityKind::Researcher => "researchers",
            EntityKind::Project => "projects",
            EntityKind::Partner => "partners",
            EntityKind::Equipment => "equipment",
            EntityKind::EventType => "event-types",
            EntityKind::Event => "events",
            EntityKind::Publication => "publications",
            EntityKind::Assign => "assignments",
            EntityKind::Work => "work",
            EntityKind::Participate => "participations",
            EntityKind::Collaborate => "collaborations",
            EntityKind::Reserve => "reservations",
        }
    }

    /// Human readable singular name used in response messages
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Grade => "Grade",
            EntityKind::Laboratory => "Laboratory",
            EntityKind::Researcher => "Researcher",
            EntityKind::Project => "Project",
            EntityKind::Partner => "Partner",
            EntityKind::Equipment => "Equipment",
            EntityKind::EventType => "Event type",
            EntityKind::Event => "Event",
            EntityKind::Publication => "Publication",
            EntityKind::Assign => "Assignment",
            EntityKind::Work => "Work assignment",
            EntityKind::Participate => "Participation",
            EntityKind::Collaborate => "Collaboration",
            EntityKind::Reserve => "Reservation",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }

    /// Client-submittable fields, in display order
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Grade => GRADE_FIELDS,
            EntityKind::Laboratory => LABORATORY_FIELDS,
            EntityKind::Researcher => RESEARCHER_FIELDS,
            EntityKind::Project => PROJECT_FIELDS,
            EntityKind::Partner => PARTNER_FIELDS,
            EntityKind::Equipment => EQUIPMENT_FIELDS,
            EntityKind::EventType => EVENT_TYPE_FIELDS,
            EntityKind::Event => EVENT_FIELDS,
            EntityKind::Publication => PUBLICATION_FIELDS,
            EntityKind::Assign => ASSIGN_FIELDS,
            EntityKind::Work => WORK_FIELDS,
            EntityKind::Participate => PARTICIPATE_FIELDS,
            EntityKind::Collaborate => COLLABORATE_FIELDS,
            EntityKind::Reserve => RESERVE_FIELDS,
        }
    }

    /// Columns written by the server only
    pub fn managed_columns(self) -> &'static [(&'static str, FieldKind)] {
        match self {
            EntityKind::Researcher => RESEARCHER_MANAGED,
            EntityKind::Project | EntityKind::Event | EntityKind::Publication => IMAGE_MANAGED,
            _ => &[],
        }
    }

    /// All stored columns except `id`, with their kinds
    pub fn columns(self) -> impl Iterator<Item = (&'static str, FieldKind)> {
        self.fields()
            .iter()
            .map(|spec| (spec.column, spec.kind))
            .chain(self.managed_columns().iter().copied())
    }

    /// Kind of a stored column; `id` counts as an integer
    pub fn column_kind(self, column: &str) -> Option<FieldKind> {
        if column == ID_COLUMN {
            return Some(FieldKind::Integer);
        }
        self.columns().find(|(name, _)| *name == column).map(|(_, kind)| kind)
    }

    /// Map an input name or a column name to the stored column.
    /// The password hash is never addressable.
    pub fn resolve_column(self, name: &str) -> Option<&'static str> {
        if name == ID_COLUMN {
            return Some(ID_COLUMN);
        }
        if let Some(spec) = self
            .fields()
            .iter()
            .find(|spec| spec.input == name || spec.column == name)
        {
            return Some(spec.column);
        }
        self.managed_columns()
            .iter()
            .map(|(column, _)| *column)
            .find(|column| *column == name && *column != PASSWORD_HASH_COLUMN)
    }

    /// Column pair that must be unique (junction tables only)
    pub fn unique_key(self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityKind::Assign => Some(("LABO_ID", "ID_PROJECT")),
            EntityKind::Work => Some(("ID_PROJECT", "ID_RESEARCHER")),
            EntityKind::Participate => Some(("ID_EVENT", "ID_RESEARCHER")),
            EntityKind::Collaborate => Some(("ID_PARTNER", "ID_PROJECT")),
            EntityKind::Reserve => Some(("ID_PROJECT", "ID_EQUIPMENT")),
            _ => None,
        }
    }

    pub fn is_junction(self) -> bool {
        self.unique_key().is_some()
    }

    pub fn has_image(self) -> bool {
        self.managed_columns()
            .iter()
            .any(|(column, _)| *column == IMAGE_COLUMN)
    }

    /// Begin/end date columns that must be ordered
    pub fn date_range(self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityKind::Project | EntityKind::Event => Some(("DATE_BEGIN", "DATE_END")),
            EntityKind::Reserve => Some(("START_DATE", "END_DATE")),
            _ => None,
        }
    }

    /// Fields in other tables that point at this one
    pub fn referenced_by(self) -> Vec<(EntityKind, &'static FieldSpec)> {
        Self::ALL
            .into_iter()
            .flat_map(|kind| kind.fields().iter().map(move |spec| (kind, spec)))
            .filter(|(_, spec)| spec.references == Some(self))
            .collect()
    }
}

/// Compare a stored value against a typed filter value.
/// Numbers compare numerically so `1` matches `1.0`.
pub fn values_match(stored: &Value, expected: &Value) -> bool {
    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Remove columns that must never leave the server
pub fn redact(mut record: Record) -> Record {
    record.remove(PASSWORD_HASH_COLUMN);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_and_tables_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_slug(kind.slug()), Some(kind));
            assert_eq!(EntityKind::from_table(kind.table()), Some(kind));
        }
        assert_eq!(EntityKind::from_slug("unicorns"), None);
    }

    #[test]
    fn resolve_column_accepts_inputs_and_columns() {
        let kind = EntityKind::Project;
        assert_eq!(kind.resolve_column("state"), Some("STATUS"));
        assert_eq!(kind.resolve_column("STATUS"), Some("STATUS"));
        assert_eq!(kind.resolve_column("id"), Some("id"));
        assert_eq!(kind.resolve_column("IMAGE"), Some("IMAGE"));
        assert_eq!(kind.resolve_column("nope"), None);
        assert_eq!(EntityKind::Researcher.resolve_column("PASSWORD_HASH"), None);
    }

    #[test]
    fn researcher_is_referenced_by_projects_and_junctions() {
        let referencing: Vec<_> = EntityKind::Researcher
            .referenced_by()
            .into_iter()
            .map(|(kind, spec)| (kind, spec.column))
            .collect();
        assert!(referencing.contains(&(EntityKind::Project, "ID_MANAGER")));
        assert!(referencing.contains(&(EntityKind::Work, "ID_RESEARCHER")));
        assert!(referencing.contains(&(EntityKind::Laboratory, "DIRECTOR")));
        assert!(!referencing.iter().any(|(kind, _)| *kind == EntityKind::Grade));
    }

    #[test]
    fn numbers_match_numerically() {
        assert!(values_match(&serde_json::json!(1.0), &serde_json::json!(1)));
        assert!(!values_match(&serde_json::json!("1"), &serde_json::json!(1)));
        assert!(values_match(&serde_json::json!("active"), &serde_json::json!("active")));
    }
}
