use assert_matches::assert_matches;
use chrono::NaiveDate;
use lab_session_manager::error::LsmError;
use lab_session_manager::naming::{
    self, SessionName, SessionTimestamp, SubjectId, parse_for_subject, parse_session_name,
    render_session_name,
};
use proptest::prelude::*;

#[test]
fn parse_and_render_agree() {
    for name in ["M020_2024_03_01_10_00", "MM12_2000_12_31_23_59", "A_2024_02_29_00_00"] {
        let parsed: SessionName = name.parse().unwrap();
        assert_eq!(render_session_name(parsed.subject(), parsed.timestamp()), name);
    }
}

#[test]
fn sessions_order_by_subject_then_time() {
    let mut names = ["M020_2024_03_01_10_00", "M020_2023_12_31_23_59", "M011_2025_01_01_00_00"]
        .map(|name| name.parse::<SessionName>().unwrap());
    names.sort();
    let rendered = names.iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(
        rendered,
        ["M011_2025_01_01_00_00", "M020_2023_12_31_23_59", "M020_2024_03_01_10_00"]
    );
}

#[test]
fn rejects_impossible_dates() {
    assert_matches!(
        "M020_2023_02_29_10_00".parse::<SessionName>(),
        Err(LsmError::InvalidSessionName { .. })
    );
    assert_matches!(
        SessionTimestamp::new(2024, 4, 31, 12, 0),
        Err(LsmError::InvalidSessionName { .. })
    );
}

#[test]
fn subject_must_match() {
    let subject: SubjectId = "M020".parse().unwrap();
    assert_matches!(
        parse_for_subject("M021_2024_03_01_10_00", &subject),
        Err(LsmError::SubjectMismatch { .. })
    );
    let parsed = parse_for_subject("M020_2024_03_01_10_00", &subject).unwrap();
    assert!(parsed.belongs_to(&subject));
}

#[test]
fn session_name_serializes_as_string() {
    let name: SessionName = "M020_2024_03_01_10_00".parse().unwrap();
    assert_eq!(
        serde_json::to_string(&name).unwrap(),
        "\"M020_2024_03_01_10_00\""
    );
    let back: SessionName = serde_json::from_str("\"M020_2024_03_01_10_00\"").unwrap();
    assert_eq!(back, name);
    assert!(serde_json::from_str::<SessionName>("\"M020-2024-03-01\"").is_err());
}

#[test]
fn derived_names() {
    let name: SessionName = "M020_2024_03_01_10_00".parse().unwrap();
    assert_eq!(naming::video_folder_name(&name), "M020_2024_03_01_10_00_cameras");
    assert_eq!(naming::video_file_name(&name, 3), "M020_2024_03_01_10_00_camera_3.avi");
    assert_eq!(naming::recording_folder_name(&name, 1), "M020_2024_03_01_10_00_g1");
    assert_eq!(naming::nwb_file_name(&name), "M020_2024_03_01_10_00.nwb");
    assert_eq!(
        naming::processed_ephys_folder_name(&name),
        "M020_2024_03_01_10_00_ephys"
    );
}

#[test]
fn calendar_edges() {
    for name in [
        "M1_0000_01_01_00_00",
        "M1_0000_02_29_00_00",
        "M1_9999_12_31_23_59",
        "M1_2024_02_29_12_00",
        "M1_2000_02_29_12_00",
    ] {
        let parsed = parse_session_name(name).unwrap();
        assert_eq!(parsed.to_string(), name);
    }
    for name in ["M1_2023_02_29_12_00", "M1_1900_02_29_12_00", "M1_2024_04_31_12_00"] {
        assert_matches!(
            parse_session_name(name),
            Err(LsmError::InvalidSessionName { .. }),
            "{name}"
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn every_valid_pair_round_trips(
        subject in "[A-Za-z][A-Za-z0-9]{0,8}",
        year in 0i32..=9999,
        month in 1u32..=12,
        day in 1u32..=31,
        hour in 0u32..=23,
        minute in 0u32..=59,
    ) {
        prop_assume!(NaiveDate::from_ymd_opt(year, month, day).is_some());
        let subject: SubjectId = subject.parse().unwrap();
        let timestamp = SessionTimestamp::new(year, month, day, hour, minute).unwrap();

        let rendered = render_session_name(&subject, timestamp);
        let parsed = parse_session_name(&rendered).unwrap();
        prop_assert_eq!(parsed.subject(), &subject);
        prop_assert_eq!(parsed.timestamp(), timestamp);
    }

    #[test]
    fn accepted_names_render_back_unchanged(
        name in "[A-Za-z][A-Za-z0-9]{0,4}_[0-9]{4}_[0-9]{2}_[0-9]{2}_[0-9]{2}_[0-9]{2}",
    ) {
        if let Ok(parsed) = parse_session_name(&name) {
            prop_assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn arbitrary_strings_never_parse_to_another_name(name in "[A-Za-z0-9_-]{0,24}") {
        if let Ok(parsed) = parse_session_name(&name) {
            prop_assert_eq!(parsed.to_string(), name);
        }
    }
}
