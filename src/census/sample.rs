use serde::Serialize;

use crate::census::{
    Agriculture, CensusService, EconomicActivity, GeographicalInfo, Household, Housing, Individual, Sex,
    YesNo,
};
use crate::error::CensusResult;

/// What [`load_sample_data`] created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleSummary {
    pub geographic_areas: usize,
    pub households: usize,
    pub individuals: usize,
}

struct SampleHousehold {
    dwelling: &'static str,
    members: &'static [(&'static str, Sex, i64, &'static str)],
}

const SAMPLE_AREAS: [(&str, &str, &str, &[SampleHousehold]); 2] = [
    (
        "Ashanti",
        "Kumasi Metropolitan",
        "Adum",
        &[
            SampleHousehold {
                dwelling: "Compound house",
                members: &[
                    ("Kwame Mensah", Sex::Male, 45, "Head"),
                    ("Ama Mensah", Sex::Female, 41, "Spouse"),
                    ("Kojo Mensah", Sex::Male, 12, "Child"),
                ],
            },
            SampleHousehold {
                dwelling: "Separate house",
                members: &[("Yaa Asantewaa", Sex::Female, 67, "Head")],
            },
        ],
    ),
    (
        "Greater Accra",
        "Accra Metropolitan",
        "Osu",
        &[SampleHousehold {
            dwelling: "Flat/Apartment",
            members: &[
                ("Nii Armah", Sex::Male, 34, "Head"),
                ("Akosua Armah", Sex::Female, 30, "Spouse"),
            ],
        }],
    ),
];

/// Loads a small fixed data set through `service`, so every row is audited
/// and the household counts are maintained the same way as for real data.
pub fn load_sample_data(service: &CensusService) -> CensusResult<SampleSummary> {
    let mut summary = SampleSummary::default();

    for (region, district, locality, households) in SAMPLE_AREAS {
        let geo_id = service.create(&GeographicalInfo {
            region_name: region.to_string(),
            district_name: district.to_string(),
            locality_name: Some(locality.to_string()),
            ..Default::default()
        })?;
        summary.geographic_areas += 1;

        for (number, sample) in households.iter().enumerate() {
            let household_id = service.create(&Household {
                household_number_in_structure: Some((number + 1).to_string()),
                ..Household::new(geo_id)
            })?;
            summary.households += 1;

            service.create(&Housing {
                household_id,
                dwelling_type: Some(sample.dwelling.to_string()),
                rooms_occupied: Some(sample.members.len() as i64),
                ..Default::default()
            })?;

            for (line, (name, sex, age, relationship)) in sample.members.iter().enumerate() {
                let individual_id = service.create(&Individual {
                    person_line_number: Some(line as i64 + 1),
                    relationship_to_head: Some(relationship.to_string()),
                    ..Individual::new(household_id, name, *sex, *age)
                })?;
                summary.individuals += 1;

                if *age >= 15 {
                    service.create(&EconomicActivity {
                        individual_id,
                        engaged_in_economic_activity: YesNo::Yes,
                        employment_status: Some("Self-employed".to_string()),
                        ..Default::default()
                    })?;
                }
            }

            if region == "Ashanti" {
                service.create(&Agriculture {
                    household_id,
                    engaged_in_agriculture: YesNo::Yes,
                    crop_farming: Some(YesNo::Yes),
                    main_crop: Some("Cocoa".to_string()),
                    ..Default::default()
                })?;
            }
        }
    }

    log::info!(
        "Loaded sample data: {} areas, {} households, {} individuals",
        summary.geographic_areas,
        summary.households,
        summary.individuals
    );
    Ok(summary)
}
