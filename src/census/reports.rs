use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::census::CensusService;
use crate::db::Table;
use crate::error::{CensusError, CensusResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStatistics {
    pub geographic_areas: i64,
    pub households: i64,
    pub individuals: i64,
    pub housing_units: i64,
    pub economic_records: i64,
    pub activity_log_entries: i64,
}

/// Population of one district, taken from the household counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalStatistics {
    pub region_name: String,
    pub district_name: String,
    pub households: i64,
    pub population: i64,
    pub males: i64,
    pub females: i64,
    pub average_age: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub individual_id: i64,
    pub full_name: String,
    pub sex: Option<String>,
    pub age: Option<i64>,
    pub relationship_to_head: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdDemographics {
    pub household_id: i64,
    pub region_name: String,
    pub district_name: String,
    pub locality_name: Option<String>,
    pub total_members: i64,
    pub total_males: i64,
    pub total_females: i64,
    #[serde(default)]
    pub members: Vec<MemberSummary>,
}

/// Housing units of one dwelling type within a district.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HousingConditions {
    pub region_name: String,
    pub district_name: String,
    pub dwelling_type: Option<String>,
    pub housing_units: i64,
    pub occupants: i64,
    pub average_rooms: Option<f64>,
    pub with_toilet: i64,
}

#[derive(Deserialize)]
struct HouseholdHeader {
    household_id: i64,
    region_name: String,
    district_name: String,
    locality_name: Option<String>,
    total_members: i64,
    total_males: i64,
    total_females: i64,
}

impl CensusService {
    pub fn database_statistics(&self) -> CensusResult<DatabaseStatistics> {
        let stats: Vec<DatabaseStatistics> = self.db().query(
            "SELECT
                (SELECT COUNT(*) FROM GEOGRAPHICAL_INFO) AS geographic_areas,
                (SELECT COUNT(*) FROM HOUSEHOLD) AS households,
                (SELECT COUNT(*) FROM INDIVIDUAL) AS individuals,
                (SELECT COUNT(*) FROM HOUSING) AS housing_units,
                (SELECT COUNT(*) FROM ECONOMIC_ACTIVITY) AS economic_records,
                (SELECT COUNT(*) FROM ACTIVITY_LOG) AS activity_log_entries",
            [],
        )?;
        stats
            .into_iter()
            .next()
            .ok_or_else(|| CensusError::Storage(anyhow::anyhow!("statistics query returned no row")))
    }

    /// Per-district totals, optionally for a single region. Population and
    /// sex counts are sums of the household aggregates.
    pub fn regional_statistics(&self, region: Option<&str>) -> CensusResult<Vec<RegionalStatistics>> {
        Ok(self.db().query(
            "SELECT g.region_name AS region_name,
                    g.district_name AS district_name,
                    COUNT(h.household_id) AS households,
                    COALESCE(SUM(h.total_members), 0) AS population,
                    COALESCE(SUM(h.total_males), 0) AS males,
                    COALESCE(SUM(h.total_females), 0) AS females,
                    (SELECT AVG(i.age)
                       FROM INDIVIDUAL i
                       JOIN HOUSEHOLD ih ON ih.household_id = i.household_id
                       JOIN GEOGRAPHICAL_INFO ig ON ig.geo_id = ih.geo_id
                      WHERE ig.region_name = g.region_name
                        AND ig.district_name = g.district_name) AS average_age
             FROM GEOGRAPHICAL_INFO g
             LEFT JOIN HOUSEHOLD h ON h.geo_id = g.geo_id
             WHERE ?1 IS NULL OR g.region_name = ?1
             GROUP BY g.region_name, g.district_name
             ORDER BY g.region_name, g.district_name",
            params![region],
        )?)
    }

    /// Housing units grouped by district and dwelling type, optionally for a
    /// single district. Occupants come from the household counts.
    pub fn housing_conditions(&self, district: Option<&str>) -> CensusResult<Vec<HousingConditions>> {
        Ok(self.db().query(
            "SELECT g.region_name AS region_name,
                    g.district_name AS district_name,
                    hs.dwelling_type AS dwelling_type,
                    COUNT(*) AS housing_units,
                    COALESCE(SUM(h.total_members), 0) AS occupants,
                    AVG(hs.rooms_occupied) AS average_rooms,
                    COUNT(hs.toilet_facility_type) AS with_toilet
             FROM HOUSING hs
             JOIN HOUSEHOLD h ON h.household_id = hs.household_id
             JOIN GEOGRAPHICAL_INFO g ON g.geo_id = h.geo_id
             WHERE ?1 IS NULL OR g.district_name = ?1
             GROUP BY g.region_name, g.district_name, hs.dwelling_type
             ORDER BY g.region_name, g.district_name, housing_units DESC, hs.dwelling_type",
            params![district],
        )?)
    }

    pub fn household_demographics(&self, household_id: i64) -> CensusResult<HouseholdDemographics> {
        let (headers, members) = self.db().transaction(|txn| {
            let headers: Vec<HouseholdHeader> = txn.query(
                "SELECT h.household_id, g.region_name, g.district_name, g.locality_name,
                        h.total_members, h.total_males, h.total_females
                 FROM HOUSEHOLD h
                 JOIN GEOGRAPHICAL_INFO g ON g.geo_id = h.geo_id
                 WHERE h.household_id = ?",
                params![household_id],
            )?;
            let members: Vec<MemberSummary> = txn.query(
                "SELECT individual_id, full_name, sex, age, relationship_to_head
                 FROM INDIVIDUAL
                 WHERE household_id = ?
                 ORDER BY COALESCE(person_line_number, individual_id)",
                params![household_id],
            )?;
            Ok((headers, members))
        })?;

        let header = headers
            .into_iter()
            .next()
            .ok_or(CensusError::NotFound { table: Table::Household, id: household_id })?;
        Ok(HouseholdDemographics {
            household_id: header.household_id,
            region_name: header.region_name,
            district_name: header.district_name,
            locality_name: header.locality_name,
            total_members: header.total_members,
            total_males: header.total_males,
            total_females: header.total_females,
            members,
        })
    }
}
