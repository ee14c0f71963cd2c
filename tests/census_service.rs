use anyhow::Result;
use census_db::census::{
    load_sample_data, Agriculture, CensusNightStatus, Fertility, GeographicalInfo, Household, Housing, Individual,
    IndividualSearch, Page, Sex, YesNo,
};
use census_db::db::{DbEvent, Filter, Table};
use census_db::{row, CensusError, CensusService, Db};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn service() -> Result<CensusService> {
    init_logging();
    Ok(CensusService::new(Db::open_memory()?))
}

fn accra(service: &CensusService) -> Result<i64> {
    Ok(service.create(&GeographicalInfo {
        region_name: "Greater Accra".to_string(),
        district_name: "Accra Metropolitan".to_string(),
        ..Default::default()
    })?)
}

#[test]
fn create_stamps_creator_and_update_stamps_modifier() -> Result<()> {
    let service = CensusService::new(Db::open_memory()?.as_user("enumerator_03"));
    let geo = accra(&service)?;
    let household = service.create(&Household::new(geo))?;

    let id = service.create(&Individual::new(household, "Nii Armah", Sex::Male, 34))?;
    let created: Individual = service.get(id)?;
    assert_eq!(created.stamps.created_by.as_deref(), Some("enumerator_03"));
    assert!(created.stamps.date_created.is_some());
    assert!(created.stamps.modified_by.is_none());
    assert_eq!(created.status_on_census_night, CensusNightStatus::Present);

    let supervisor = CensusService::new(service.db().as_user("supervisor"));
    supervisor.update(id, &Individual { age: Some(35), ..created.clone() })?;
    let updated: Individual = service.get(id)?;
    assert_eq!(updated.age, Some(35));
    assert_eq!(updated.stamps.created_by.as_deref(), Some("enumerator_03"));
    assert_eq!(updated.stamps.modified_by.as_deref(), Some("supervisor"));
    Ok(())
}

#[test]
fn missing_records_are_not_found() -> Result<()> {
    let service = service()?;

    assert!(matches!(
        service.get::<Household>(41),
        Err(CensusError::NotFound { table: Table::Household, id: 41 })
    ));
    assert!(matches!(
        service.update_columns::<Individual>(7, row! { "age" => 3_i64 }),
        Err(CensusError::NotFound { table: Table::Individual, id: 7 })
    ));
    assert!(matches!(
        service.delete::<Agriculture>(9),
        Err(CensusError::NotFound { table: Table::Agriculture, id: 9 })
    ));
    Ok(())
}

#[test]
fn constraint_failures_are_distinguished() -> Result<()> {
    let service = service()?;
    let geo = accra(&service)?;
    let household = service.create(&Household::new(geo))?;

    // Unknown household.
    let orphan = service.create(&Individual::new(9999, "Nobody", Sex::Female, 20));
    assert!(matches!(orphan, Err(CensusError::ConstraintViolation(_))), "{:?}", orphan);

    // Age out of range.
    let ancient = service.create(&Individual::new(household, "Methuselah", Sex::Male, 969));
    assert!(matches!(ancient, Err(CensusError::ConstraintViolation(_))), "{:?}", ancient);

    // A household with members cannot be deleted.
    service.create(&Individual::new(household, "Akosua", Sex::Female, 30))?;
    let delete = service.delete::<Household>(household);
    assert!(matches!(delete, Err(CensusError::ConstraintViolation(_))), "{:?}", delete);
    let still_there: Household = service.get(household)?;
    assert_eq!(still_there.total_members, 1);
    Ok(())
}

#[test]
fn invalid_input_is_rejected_before_writing() -> Result<()> {
    let service = service()?;
    let blank = service.create(&GeographicalInfo::default());
    assert!(matches!(blank, Err(CensusError::InvalidInput(_))));

    let geo = accra(&service)?;
    let household = service.create(&Household::new(geo))?;
    let individual = service.create(&Individual::new(household, "Abena", Sex::Female, 29))?;
    let impossible = service.create(&Fertility {
        individual_id: individual,
        children_born_girls: 1,
        children_surviving_girls: 2,
        ..Default::default()
    });
    assert!(matches!(impossible, Err(CensusError::InvalidInput(_))));

    let mismatched = Individual {
        individual_id: Some(individual + 1),
        ..Individual::new(household, "Abena", Sex::Female, 29)
    };
    assert!(matches!(service.update(individual, &mismatched), Err(CensusError::InvalidInput(_))));
    Ok(())
}

#[test]
fn list_filters_by_column() -> Result<()> {
    let service = service()?;
    let geo = accra(&service)?;
    let a = service.create(&Household::new(geo))?;
    let b = service.create(&Household::new(geo))?;
    service.create(&Individual::new(a, "Kofi", Sex::Male, 50))?;
    service.create(&Individual::new(b, "Efua", Sex::Female, 48))?;
    service.create(&Individual::new(b, "Kwabena", Sex::Male, 19))?;

    let in_b: Vec<Individual> = service.list(&Filter::eq("household_id", b))?;
    let names: Vec<_> = in_b.iter().map(|i| i.full_name.as_str()).collect();
    assert_eq!(names, vec!["Efua", "Kwabena"]);

    let farms: Vec<Agriculture> = service.list(&Filter::All)?;
    assert!(farms.is_empty());
    Ok(())
}

#[test]
fn subscribers_see_committed_changes() -> Result<()> {
    let service = service()?;
    let rx = service.db().subscribe();
    let geo = accra(&service)?;
    let household = service.create(&Household::new(geo))?;
    let individual = service.create(&Individual::new(household, "Adwoa", Sex::Female, 5))?;

    let events: Vec<DbEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            DbEvent::Insert(Table::GeographicalInfo, geo),
            DbEvent::Insert(Table::Household, household),
            DbEvent::Insert(Table::Individual, individual),
            DbEvent::Update(Table::Household, household),
        ]
    );
    Ok(())
}

#[test]
fn reports_read_the_maintained_counts() -> Result<()> {
    let service = service()?;
    let summary = load_sample_data(&service)?;
    assert_eq!(summary.households, 3);
    assert_eq!(summary.individuals, 6);

    let stats = service.database_statistics()?;
    assert_eq!(stats.geographic_areas, 2);
    assert_eq!(stats.households, 3);
    assert_eq!(stats.individuals, 6);
    assert_eq!(stats.housing_units, 3);
    assert!(stats.activity_log_entries > 0);

    let ashanti = service.regional_statistics(Some("Ashanti"))?;
    assert_eq!(ashanti.len(), 1);
    assert_eq!(ashanti[0].households, 2);
    assert_eq!(ashanti[0].population, 4);
    assert_eq!((ashanti[0].males, ashanti[0].females), (2, 2));
    assert!(ashanti[0].average_age.is_some());

    assert_eq!(service.regional_statistics(None)?.len(), 2);

    let farms: Vec<Agriculture> = service.list(&Filter::All)?;
    assert!(farms.iter().all(|f| f.engaged_in_agriculture == YesNo::Yes));

    let first: Vec<Household> = service.list(&Filter::All)?;
    let demographics = service.household_demographics(first[0].household_id.unwrap_or_default())?;
    assert_eq!(demographics.region_name, "Ashanti");
    assert_eq!(demographics.total_members, 3);
    assert_eq!(demographics.members.len(), 3);
    assert_eq!(demographics.members[0].full_name, "Kwame Mensah");

    assert!(matches!(
        service.household_demographics(404),
        Err(CensusError::NotFound { table: Table::Household, id: 404 })
    ));
    Ok(())
}

#[test]
fn housing_conditions_by_district() -> Result<()> {
    let service = service()?;
    load_sample_data(&service)?;

    let kumasi = service.housing_conditions(Some("Kumasi Metropolitan"))?;
    let summary: Vec<_> = kumasi
        .iter()
        .map(|c| (c.dwelling_type.as_deref(), c.housing_units, c.occupants, c.average_rooms))
        .collect();
    assert_eq!(
        summary,
        vec![(Some("Compound house"), 1, 3, Some(3.0)), (Some("Separate house"), 1, 1, Some(1.0))]
    );

    let households: Vec<Household> = service.list(&Filter::All)?;
    let accra = households[2].household_id.unwrap_or_default();
    service.create(&Housing {
        household_id: accra,
        dwelling_type: Some("Flat/Apartment".to_string()),
        rooms_occupied: Some(4),
        toilet_facility_type: Some("W.C.".to_string()),
        ..Default::default()
    })?;
    let all = service.housing_conditions(None)?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].region_name, "Ashanti");
    let flats = &all[2];
    assert_eq!((flats.district_name.as_str(), flats.housing_units), ("Accra Metropolitan", 2));
    assert_eq!(flats.average_rooms, Some(3.0));
    assert_eq!(flats.with_toilet, 1);

    assert!(service.housing_conditions(Some("Nowhere"))?.is_empty());
    Ok(())
}

#[test]
fn search_individuals_filters_and_pages() -> Result<()> {
    let service = service()?;
    load_sample_data(&service)?;

    let ashanti = service.search_individuals(
        &IndividualSearch { region_name: Some("Ashanti".to_string()), ..Default::default() },
        Page::default(),
    )?;
    assert_eq!(ashanti.total, 4);
    assert!(ashanti.individuals.iter().all(|i| i.district_name == "Kumasi Metropolitan"));

    let women = service.search_individuals(
        &IndividualSearch { sex: Some(Sex::Female), ..Default::default() },
        Page::default(),
    )?;
    let names: Vec<_> = women.individuals.iter().map(|i| i.full_name.as_str()).collect();
    assert_eq!(names, vec!["Ama Mensah", "Yaa Asantewaa", "Akosua Armah"]);

    let adults = service.search_individuals(
        &IndividualSearch { min_age: Some(18), max_age: Some(50), ..Default::default() },
        Page::default(),
    )?;
    assert_eq!(adults.total, 4);

    let first = service.search_individuals(&IndividualSearch::default(), Page::new(1, 4))?;
    let second = service.search_individuals(&IndividualSearch::default(), Page::new(2, 4))?;
    let third = service.search_individuals(&IndividualSearch::default(), Page::new(3, 4))?;
    assert_eq!((first.total, first.individuals.len()), (6, 4));
    assert_eq!((second.total, second.individuals.len()), (6, 2));
    assert!(third.individuals.is_empty());
    assert_eq!(first.page_count(), 2);
    let last_of_first = first.individuals.last().map(|i| i.individual_id);
    assert!(last_of_first < second.individuals.first().map(|i| i.individual_id));

    let accra = IndividualSearch { district_name: Some("Accra Metropolitan".to_string()), ..Default::default() };
    let nii = service.search_individuals(&accra, Page::default())?.individuals[0].individual_id;
    service.update_columns::<Individual>(
        nii,
        row! { "marital_status" => "Married", "highest_education_level" => "Tertiary" },
    )?;
    let graduates = service.search_individuals(
        &IndividualSearch {
            marital_status: Some("Married".to_string()),
            education_level: Some("Tertiary".to_string()),
            ..Default::default()
        },
        Page::default(),
    )?;
    assert_eq!(graduates.total, 1);
    assert_eq!(graduates.individuals[0].full_name, "Nii Armah");
    assert_eq!(graduates.individuals[0].locality_name.as_deref(), Some("Osu"));

    assert!(matches!(
        service.search_individuals(&IndividualSearch::default(), Page::new(0, 10)),
        Err(CensusError::InvalidInput(_))
    ));
    assert!(matches!(
        service.search_individuals(&IndividualSearch::default(), Page::new(1, 500)),
        Err(CensusError::InvalidInput(_))
    ));
    assert!(matches!(
        service.search_individuals(&IndividualSearch { min_age: Some(-1), ..Default::default() }, Page::default()),
        Err(CensusError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn file_database_keeps_log_across_reopen() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("census.sqlite");
    {
        let service = CensusService::new(Db::open(&path)?);
        accra(&service)?;
    }
    let service = CensusService::new(Db::open(&path)?);
    let entries = service.activity_log(&Default::default())?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].table_name, "GEOGRAPHICAL_INFO");
    Ok(())
}
