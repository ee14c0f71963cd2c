use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

use crate::db::{Row, Table};

/// A typed record of one census entity table. Fields are named after the
/// table's columns; columns a type leaves out are left at their defaults on
/// insert and untouched on update.
pub trait CensusEntity: Serialize + DeserializeOwned {
    const TABLE: Table;

    /// Columns clients may not write. They are dropped from every payload.
    const DERIVED_COLUMNS: &'static [&'static str] = &[];

    fn id(&self) -> Option<i64>;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Who created and last modified a record, and when. Filled in by the
/// service, never by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStamps {
    pub date_created: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub date_modified: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

pub const STAMP_COLUMNS: [&str; 4] = ["date_created", "created_by", "date_modified", "modified_by"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum YesNo {
    #[serde(rename = "Y")]
    Yes,
    #[default]
    #[serde(rename = "N")]
    No,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HousingUnitStatus {
    #[default]
    Occupied,
    Vacant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CensusNightStatus {
    #[default]
    Present,
    Absent,
    Visitor,
}

fn default_visits() -> i64 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicalInfo {
    pub geo_id: Option<i64>,
    pub region_name: String,
    pub district_name: String,
    pub district_type: Option<String>,
    pub sub_district: Option<String>,
    pub locality_name: Option<String>,
    pub nhis_ecg_vra_number: Option<String>,
    pub detailed_address: Option<String>,
    pub contact_phone_1: Option<String>,
    pub contact_phone_2: Option<String>,
    pub enumeration_area_code: Option<String>,
    pub ea_type: Option<String>,
    pub locality_code: Option<String>,
    pub structure_number: Option<String>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for GeographicalInfo {
    const TABLE: Table = Table::GeographicalInfo;

    fn id(&self) -> Option<i64> {
        self.geo_id
    }

    fn validate(&self) -> Result<(), String> {
        if self.region_name.trim().is_empty() || self.district_name.trim().is_empty() {
            return Err("region_name and district_name are required".to_string());
        }
        Ok(())
    }
}

/// A household. The member counts are read-only: they always reflect the
/// INDIVIDUAL rows that reference the household.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub household_id: Option<i64>,
    pub geo_id: i64,
    pub household_number_in_structure: Option<String>,
    pub type_of_residence: Option<String>,
    pub interview_date_started: Option<String>,
    pub interview_date_completed: Option<String>,
    #[serde(default = "default_visits")]
    pub total_visits: i64,
    pub form_number: Option<String>,
    #[serde(default)]
    pub housing_unit_status: HousingUnitStatus,
    #[serde(default)]
    pub total_members: i64,
    #[serde(default)]
    pub total_males: i64,
    #[serde(default)]
    pub total_females: i64,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl Household {
    pub fn new(geo_id: i64) -> Self {
        Self {
            household_id: None,
            geo_id,
            household_number_in_structure: None,
            type_of_residence: None,
            interview_date_started: None,
            interview_date_completed: None,
            total_visits: default_visits(),
            form_number: None,
            housing_unit_status: HousingUnitStatus::default(),
            total_members: 0,
            total_males: 0,
            total_females: 0,
            stamps: RecordStamps::default(),
        }
    }
}

impl CensusEntity for Household {
    const TABLE: Table = Table::Household;
    const DERIVED_COLUMNS: &'static [&'static str] = Table::Household.derived_columns();

    fn id(&self) -> Option<i64> {
        self.household_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub individual_id: Option<i64>,
    pub household_id: i64,
    pub person_line_number: Option<i64>,
    pub full_name: String,
    pub relationship_to_head: Option<String>,
    pub sex: Option<Sex>,
    pub date_of_birth: Option<String>,
    pub age: Option<i64>,
    pub nationality: Option<String>,
    pub ethnicity: Option<String>,
    pub religion: Option<String>,
    pub marital_status: Option<String>,
    pub highest_education_level: Option<String>,
    #[serde(default)]
    pub status_on_census_night: CensusNightStatus,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl Individual {
    pub fn new(household_id: i64, full_name: &str, sex: Sex, age: i64) -> Self {
        Self {
            individual_id: None,
            household_id,
            person_line_number: None,
            full_name: full_name.to_string(),
            relationship_to_head: None,
            sex: Some(sex),
            date_of_birth: None,
            age: Some(age),
            nationality: None,
            ethnicity: None,
            religion: None,
            marital_status: None,
            highest_education_level: None,
            status_on_census_night: CensusNightStatus::default(),
            stamps: RecordStamps::default(),
        }
    }
}

impl CensusEntity for Individual {
    const TABLE: Table = Table::Individual;

    fn id(&self) -> Option<i64> {
        self.individual_id
    }

    fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("full_name is required".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Housing {
    pub housing_id: Option<i64>,
    pub household_id: i64,
    pub dwelling_type: Option<String>,
    pub outer_wall_material: Option<String>,
    pub floor_material: Option<String>,
    pub roof_material: Option<String>,
    pub rooms_occupied: Option<i64>,
    pub rooms_for_sleeping: Option<i64>,
    pub main_lighting_source: Option<String>,
    pub main_drinking_water_source: Option<String>,
    pub toilet_facility_type: Option<String>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Housing {
    const TABLE: Table = Table::Housing;

    fn id(&self) -> Option<i64> {
        self.housing_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomicActivity {
    pub economic_id: Option<i64>,
    pub individual_id: i64,
    #[serde(default)]
    pub engaged_in_economic_activity: YesNo,
    pub occupation_description: Option<String>,
    pub occupation_code: Option<String>,
    pub workplace_name: Option<String>,
    pub employment_status: Option<String>,
    pub employment_sector: Option<String>,
    #[serde(default)]
    pub owns_mobile_phone: YesNo,
    #[serde(default)]
    pub uses_internet: YesNo,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for EconomicActivity {
    const TABLE: Table = Table::EconomicActivity;

    fn id(&self) -> Option<i64> {
        self.economic_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fertility {
    pub fertility_id: Option<i64>,
    pub individual_id: i64,
    pub children_born_boys: i64,
    pub children_born_girls: i64,
    pub children_surviving_boys: i64,
    pub children_surviving_girls: i64,
    pub children_born_last_12months_boys: i64,
    pub children_born_last_12months_girls: i64,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Fertility {
    const TABLE: Table = Table::Fertility;

    fn id(&self) -> Option<i64> {
        self.fertility_id
    }

    fn validate(&self) -> Result<(), String> {
        if self.children_surviving_boys > self.children_born_boys
            || self.children_surviving_girls > self.children_born_girls
        {
            return Err("surviving children cannot exceed children born".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mortality {
    pub mortality_id: Option<i64>,
    pub household_id: i64,
    pub deceased_name: Option<String>,
    pub sex: Option<Sex>,
    pub age_at_death: Option<i64>,
    pub date_of_death: Option<String>,
    pub cause_of_death: Option<String>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Mortality {
    const TABLE: Table = Table::Mortality;

    fn id(&self) -> Option<i64> {
        self.mortality_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Agriculture {
    pub agriculture_id: Option<i64>,
    pub household_id: i64,
    #[serde(default)]
    pub engaged_in_agriculture: YesNo,
    pub crop_farming: Option<YesNo>,
    pub livestock_rearing: Option<YesNo>,
    pub main_crop: Option<String>,
    pub farm_size_acres: Option<f64>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Agriculture {
    const TABLE: Table = Table::Agriculture;

    fn id(&self) -> Option<i64> {
        self.agriculture_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Emigration {
    pub emigration_id: Option<i64>,
    pub household_id: i64,
    pub emigrant_name: Option<String>,
    pub sex: Option<Sex>,
    pub age_at_departure: Option<i64>,
    pub destination_country: Option<String>,
    pub year_of_departure: Option<i64>,
    pub reason_for_leaving: Option<String>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Emigration {
    const TABLE: Table = Table::Emigration;

    fn id(&self) -> Option<i64> {
        self.emigration_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Disability {
    pub disability_id: Option<i64>,
    pub individual_id: i64,
    pub visual_difficulty: Option<YesNo>,
    pub hearing_difficulty: Option<YesNo>,
    pub mobility_difficulty: Option<YesNo>,
    pub cognitive_difficulty: Option<YesNo>,
    #[serde(flatten)]
    pub stamps: RecordStamps,
}

impl CensusEntity for Disability {
    const TABLE: Table = Table::Disability;

    fn id(&self) -> Option<i64> {
        self.disability_id
    }
}

/// Maps an entity to the columns a client may write: the primary key, the
/// stamp columns and the entity's derived columns are removed.
pub fn writable_row<E: CensusEntity>(entity: &E) -> Result<Row> {
    let object = match serde_json::to_value(entity)? {
        JsonValue::Object(object) => object,
        other => return Err(anyhow::anyhow!("{} must serialize to an object, got {}", E::TABLE, other)),
    };

    let mut row = Row::new();
    for (column, value) in object {
        if column == E::TABLE.primary_key()
            || STAMP_COLUMNS.contains(&column.as_str())
            || E::DERIVED_COLUMNS.contains(&column.as_str())
        {
            continue;
        }
        row.insert(column, json_to_sql(value)?);
    }
    Ok(row)
}

/// Reads an entity back from a stored row.
pub fn entity_from_row<E: CensusEntity>(row: Row) -> Result<E> {
    let mut object = Map::new();
    for (column, value) in row {
        object.insert(column, sql_to_json(value)?);
    }
    Ok(serde_json::from_value(JsonValue::Object(object))?)
}

fn json_to_sql(value: JsonValue) -> Result<Value> {
    Ok(match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(b.into()),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().ok_or_else(|| anyhow::anyhow!("Unsupported number {}", n))?),
        },
        JsonValue::String(s) => Value::Text(s),
        other => return Err(anyhow::anyhow!("Unsupported column value {}", other)),
    })
}

fn sql_to_json(value: Value) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::Number(i.into()),
        Value::Real(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => return Err(anyhow::anyhow!("Unexpected blob of {} bytes", b.len())),
    })
}
