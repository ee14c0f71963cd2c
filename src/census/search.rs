use rusqlite::{params_from_iter, types::Value};
use serde::{Deserialize, Serialize};

use crate::census::{CensusService, Sex};
use crate::error::{CensusError, CensusResult};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Optional criteria for [`CensusService::search_individuals`]. Criteria
/// that are set must all match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualSearch {
    pub region_name: Option<String>,
    pub district_name: Option<String>,
    pub sex: Option<Sex>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub marital_status: Option<String>,
    pub education_level: Option<String>,
}

/// One-based page of results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 20 }
    }
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    fn validate(&self) -> CensusResult<()> {
        if self.number == 0 {
            return Err(CensusError::InvalidInput("page numbers start at 1".to_string()));
        }
        if self.size == 0 || self.size > MAX_PAGE_SIZE {
            return Err(CensusError::InvalidInput(format!(
                "page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualMatch {
    pub individual_id: i64,
    pub household_id: i64,
    pub full_name: String,
    pub sex: Option<String>,
    pub age: Option<i64>,
    pub marital_status: Option<String>,
    pub highest_education_level: Option<String>,
    pub region_name: String,
    pub district_name: String,
    pub locality_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Number of matches across all pages.
    pub total: i64,
    pub page: Page,
    pub individuals: Vec<IndividualMatch>,
}

impl SearchResults {
    pub fn page_count(&self) -> i64 {
        let size = i64::from(self.page.size);
        (self.total + size - 1) / size
    }
}

impl IndividualSearch {
    fn validate(&self) -> CensusResult<()> {
        if self.min_age.is_some_and(|age| age < 0) {
            return Err(CensusError::InvalidInput("min_age cannot be negative".to_string()));
        }
        if self.max_age.is_some_and(|age| age > 150) {
            return Err(CensusError::InvalidInput("max_age cannot exceed 150".to_string()));
        }
        Ok(())
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        let mut text = |condition: &'static str, value: &Option<String>| {
            if let Some(value) = value {
                conditions.push(condition);
                values.push(Value::Text(value.clone()));
            }
        };
        text("g.region_name = ?", &self.region_name);
        text("g.district_name = ?", &self.district_name);
        text("i.marital_status = ?", &self.marital_status);
        text("i.highest_education_level = ?", &self.education_level);

        if let Some(sex) = self.sex {
            conditions.push("i.sex = ?");
            values.push(Value::Text(sex.as_str().to_string()));
        }
        if let Some(age) = self.min_age {
            conditions.push("i.age >= ?");
            values.push(Value::Integer(age));
        }
        if let Some(age) = self.max_age {
            conditions.push("i.age <= ?");
            values.push(Value::Integer(age));
        }

        if conditions.is_empty() {
            ("1 = 1".to_string(), values)
        } else {
            (conditions.join(" AND "), values)
        }
    }
}

const SEARCH_FROM: &str = "FROM INDIVIDUAL i
     JOIN HOUSEHOLD h ON h.household_id = i.household_id
     JOIN GEOGRAPHICAL_INFO g ON g.geo_id = h.geo_id";

impl CensusService {
    /// Individuals matching `search`, ordered by id, one page at a time.
    /// The count and the page are read in the same transaction.
    pub fn search_individuals(&self, search: &IndividualSearch, page: Page) -> CensusResult<SearchResults> {
        search.validate()?;
        page.validate()?;
        let (where_clause, values) = search.where_clause();

        let (total, individuals) = self.db().transaction(|txn| {
            let total: i64 = txn.connection().query_row(
                &format!("SELECT COUNT(*) {} WHERE {}", SEARCH_FROM, where_clause),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let mut page_values = values.clone();
            page_values.push(Value::Integer(i64::from(page.size)));
            page_values.push(Value::Integer(page.offset()));
            let individuals: Vec<IndividualMatch> = txn.query(
                &format!(
                    "SELECT i.individual_id, i.household_id, i.full_name, i.sex, i.age,
                            i.marital_status, i.highest_education_level,
                            g.region_name, g.district_name, g.locality_name
                     {} WHERE {}
                     ORDER BY i.individual_id
                     LIMIT ? OFFSET ?",
                    SEARCH_FROM, where_clause
                ),
                params_from_iter(page_values),
            )?;
            Ok((total, individuals))
        })?;

        Ok(SearchResults { total, page, individuals })
    }
}
