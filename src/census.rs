//! Typed census records and the service that reads and writes them.

mod entities;
mod reports;
mod sample;
mod search;
mod service;

pub use entities::{
    Agriculture, CensusEntity, CensusNightStatus, Disability, EconomicActivity, Emigration, Fertility,
    GeographicalInfo, Household, Housing, HousingUnitStatus, Individual, Mortality, RecordStamps, Sex,
    YesNo,
};
pub use reports::{
    DatabaseStatistics, HouseholdDemographics, HousingConditions, MemberSummary, RegionalStatistics,
};
pub use sample::{load_sample_data, SampleSummary};
pub use search::{IndividualMatch, IndividualSearch, Page, SearchResults};
pub use service::CensusService;
