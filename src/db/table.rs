use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed relational schema. Each variant knows its SQL name, its integer
/// primary key column and the subset of columns captured in activity log
/// snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    GeographicalInfo,
    Household,
    Individual,
    Housing,
    EconomicActivity,
    Fertility,
    Mortality,
    Agriculture,
    Emigration,
    Disability,
    ActivityLog,
}

impl Table {
    pub const ENTITY_TABLES: [Table; 10] = [
        Table::GeographicalInfo,
        Table::Household,
        Table::Individual,
        Table::Housing,
        Table::EconomicActivity,
        Table::Fertility,
        Table::Mortality,
        Table::Agriculture,
        Table::Emigration,
        Table::Disability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::GeographicalInfo => "GEOGRAPHICAL_INFO",
            Table::Household => "HOUSEHOLD",
            Table::Individual => "INDIVIDUAL",
            Table::Housing => "HOUSING",
            Table::EconomicActivity => "ECONOMIC_ACTIVITY",
            Table::Fertility => "FERTILITY",
            Table::Mortality => "MORTALITY",
            Table::Agriculture => "AGRICULTURE",
            Table::Emigration => "EMIGRATION",
            Table::Disability => "DISABILITY",
            Table::ActivityLog => "ACTIVITY_LOG",
        }
    }

    pub fn primary_key(&self) -> &'static str {
        match self {
            Table::GeographicalInfo => "geo_id",
            Table::Household => "household_id",
            Table::Individual => "individual_id",
            Table::Housing => "housing_id",
            Table::EconomicActivity => "economic_id",
            Table::Fertility => "fertility_id",
            Table::Mortality => "mortality_id",
            Table::Agriculture => "agriculture_id",
            Table::Emigration => "emigration_id",
            Table::Disability => "disability_id",
            Table::ActivityLog => "log_id",
        }
    }

    /// Columns rendered into before/after snapshots, in snapshot order.
    /// Empty for tables that are not audited.
    pub fn audited_fields(&self) -> &'static [&'static str] {
        match self {
            Table::GeographicalInfo => &[
                "region_name",
                "district_name",
                "locality_name",
                "enumeration_area_code",
            ],
            Table::Household => &[
                "geo_id",
                "household_number_in_structure",
                "type_of_residence",
                "housing_unit_status",
                "total_members",
                "total_males",
                "total_females",
            ],
            Table::Individual => &[
                "household_id",
                "full_name",
                "sex",
                "age",
                "relationship_to_head",
            ],
            Table::Housing => &[
                "household_id",
                "dwelling_type",
                "rooms_occupied",
                "main_drinking_water_source",
            ],
            Table::EconomicActivity => &[
                "individual_id",
                "engaged_in_economic_activity",
                "occupation_description",
                "employment_status",
            ],
            Table::Fertility => &["individual_id", "children_born_boys", "children_born_girls"],
            Table::Mortality => &[
                "household_id",
                "deceased_name",
                "sex",
                "age_at_death",
                "cause_of_death",
            ],
            Table::Agriculture => &[
                "household_id",
                "engaged_in_agriculture",
                "crop_farming",
                "livestock_rearing",
            ],
            Table::Emigration => &["household_id", "emigrant_name", "sex", "destination_country"],
            Table::Disability => &[
                "individual_id",
                "visual_difficulty",
                "hearing_difficulty",
                "mobility_difficulty",
            ],
            Table::ActivityLog => &[],
        }
    }

    /// Columns maintained by the write path itself. Client statements that
    /// name one of these are rejected.
    pub const fn derived_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Household => &["total_members", "total_males", "total_females"],
            _ => &[],
        }
    }

    pub fn is_audited(&self) -> bool {
        !self.audited_fields().is_empty()
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ENTITY_TABLES
            .iter()
            .chain(std::iter::once(&Table::ActivityLog))
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .copied()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
