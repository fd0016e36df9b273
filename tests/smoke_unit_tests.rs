//! Smoke screen unit tests for the document approval components
//!
//! These tests span the codebase and exercise single components in isolation
//! from the service scenarios. They are intended as a smoke screen and mostly
//! cover the happy path.
use chrono::{Datelike, Timelike, Utc};
use document_approval::{
    approval::{ApprovalRecord, ApprovalState, ApprovalStatus, Approver, UserId},
    builder::DocumentDraft,
    config::ServiceConfig,
    document::{ContentField, DocumentBody, DocumentId, DocumentKind, Product, grand_total},
    error::{ApprovalError, ValidationError},
    role::{Operation, Role, permits},
    stage::{Priority, StageDraft},
    timestamp::{DayStamp, TimeStamp},
    utils::{document_tag, new_uuid_to_bech32},
};

fn record(user: &UserId, role: Role) -> ApprovalRecord {
    ApprovalRecord {
        user_id: user.clone(),
        username: user.to_string(),
        role,
        approval_date: TimeStamp::now(),
    }
}

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids are bech32 strings carrying the requested prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("proposal_").unwrap();
        assert!(encoded.starts_with("proposal_1"));
        assert!(encoded.len() > 20);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn document_ids_recover_their_kind() {
        for kind in DocumentKind::ALL {
            let id = DocumentId::new(kind).unwrap();
            assert_eq!(id.kind(), Some(kind));
        }
        assert_eq!(DocumentId::from("legacy-object-id").kind(), None);
    }

    #[test]
    fn tag_joins_title_and_local_submission_time() {
        let submitted = TimeStamp::new_with(2025, 3, 7, 9, 5, 0);
        assert_eq!(
            document_tag(" Đề xuất ", &submitted),
            "Đề xuất-07-03-2025 09:05:00"
        );
    }
}

// TIMESTAMP MODULE TESTS
mod timestamp_tests {
    use super::*;

    #[test]
    fn now_is_close_to_the_clock() {
        let ts = TimeStamp::now();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff <= 1);
        assert_eq!(ts.to_datetime_utc().nanosecond(), 0);
    }

    /// Local wall clock values are Bangkok time, seven hours ahead of UTC
    #[test]
    fn new_with_is_local_time() {
        let dt = TimeStamp::new_with(2024, 6, 15, 10, 30, 0).to_datetime_utc();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 3);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn timestamps_are_stored_as_local_strings() {
        let original = TimeStamp::new_with(2025, 12, 31, 23, 59, 58);
        let encoded = minicbor::to_vec(original).unwrap();
        let raw: String = minicbor::decode(&encoded).unwrap();
        assert_eq!(raw, "31-12-2025 23:59:58");

        let decoded: TimeStamp = minicbor::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn days_compare_as_dates_not_strings() {
        let earlier = DayStamp::parse("31-01-2025").unwrap();
        let later = DayStamp::parse("01-02-2025").unwrap();
        assert!(earlier < later);
        assert_eq!(earlier.add_days(1), later);
        assert!(DayStamp::parse("2025-02-01").is_err());
    }
}

// APPROVAL STATE TESTS
mod approval_tests {
    use super::*;

    fn two_approvers() -> (UserId, UserId, ApprovalState) {
        let a = UserId::from("user_a");
        let b = UserId::from("user_b");
        let state = ApprovalState::new(vec![
            Approver::new(a.clone(), "a", ""),
            Approver::new(b.clone(), "b", ""),
        ])
        .unwrap();
        (a, b, state)
    }

    #[test]
    fn approves_once_everyone_has() {
        let (a, b, mut state) = two_approvers();
        assert_eq!(state.approve(record(&a, Role::Employee)).unwrap(), ApprovalStatus::Pending);
        assert!(state.is_partially_approved());
        assert_eq!(state.approve(record(&b, Role::Employee)).unwrap(), ApprovalStatus::Approved);
        assert!(state.is_consistent());
    }

    #[test]
    fn duplicate_approvers_are_rejected() {
        let a = UserId::from("user_a");
        let err = ApprovalState::new(vec![
            Approver::new(a.clone(), "a", ""),
            Approver::new(a, "a again", ""),
        ])
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateApprover("user_a".to_string()));
    }

    #[test]
    fn suspend_then_open_starts_over() {
        let (a, _, mut state) = two_approvers();
        state.approve(record(&a, Role::Employee)).unwrap();

        let cleared = state.suspend("thiếu chứng từ").unwrap();
        assert_eq!(cleared.len(), 1);
        assert!(state.suspend("again").is_err());

        state.open().unwrap();
        assert_eq!(state.status(), ApprovalStatus::Pending);
        assert!(state.approved_by().is_empty());
        assert!(state.open().is_err());
    }
}

// ROLE GATE TESTS
mod role_tests {
    use super::*;

    #[test]
    fn roles_round_trip_by_name() {
        for name in ["director", "deputyDirector", "captainOfAccounting", "employee"] {
            assert_eq!(Role::parse(name).as_str(), name);
        }
        assert_eq!(Role::parse("intern"), Role::Other("intern".to_string()));
    }

    #[test]
    fn suspend_rights_depend_on_the_kind() {
        assert!(permits(DocumentKind::Payment, Operation::Suspend, &Role::HeadOfAccounting));
        assert!(!permits(DocumentKind::Payment, Operation::Suspend, &Role::HeadOfPurchasing));
        assert!(permits(DocumentKind::Purchasing, Operation::Suspend, &Role::HeadOfPurchasing));
        assert!(!permits(DocumentKind::Purchasing, Operation::Suspend, &Role::Employee));
        assert!(permits(DocumentKind::Generic, Operation::Approve, &Role::Employee));
    }
}

// BUILDER TESTS
mod builder_tests {
    use super::*;

    fn director() -> Approver {
        Approver::new(UserId::from("user_director"), "giamdoc", "Giám đốc")
    }

    #[test]
    fn purchasing_total_is_recomputed() {
        let products = vec![
            Product {
                product_name: "Ốc vít".to_string(),
                cost_per_unit: 1_000,
                amount: 100,
                vat_percent: 10,
                cost_center: String::new(),
                note: String::new(),
            },
            Product {
                product_name: "Bu lông".to_string(),
                cost_per_unit: 2_000,
                amount: 50,
                vat_percent: 0,
                cost_center: String::new(),
                note: String::new(),
            },
        ];
        assert_eq!(grand_total(&products), 210_000);

        let doc = DocumentDraft::new(DocumentKind::Purchasing)
            .set_title("Mua vật tư")
            .set_submitted_by(UserId::from("user_s"))
            .add_approver(director())
            .set_body(DocumentBody::Purchasing {
                products,
                grand_total_cost: 1,
                appended_proposals: vec![],
            })
            .validate_and_finalise()
            .unwrap();
        assert_eq!(doc.approval_amount(), 210_000);
    }

    #[test]
    fn stages_are_refused_on_unstaged_kinds() {
        let err = DocumentDraft::new(DocumentKind::Generic)
            .set_title("Công văn")
            .set_submitted_by(UserId::from("user_s"))
            .add_approver(director())
            .add_stage(StageDraft::new("Đợt 1", 1, "01-01-2026").add_approver(director()))
            .set_body(DocumentBody::Generic {
                content: vec![ContentField {
                    name: "a".to_string(),
                    text: "b".to_string(),
                }],
            })
            .validate_and_finalise()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApprovalError>(),
            Some(ApprovalError::Validation(ValidationError::WrongKind { .. }))
        ));
    }

    #[test]
    fn stage_drafts_are_validated() {
        let bad_date = StageDraft::new("Đợt 1", 1, "2026/01/01").add_approver(director());
        assert!(matches!(
            bad_date.validate(),
            Err(ValidationError::InvalidDate(_))
        ));

        let bad_priority = StageDraft::new("Đợt 1", 1, "01-01-2026")
            .set_priority("Gấp")
            .add_approver(director());
        assert!(matches!(
            bad_priority.validate(),
            Err(ValidationError::InvalidPriority(_))
        ));

        let stage = StageDraft::new("Đợt 1", 1, "01-01-2026")
            .set_priority("Thấp")
            .add_approver(director())
            .validate()
            .unwrap();
        assert_eq!(stage.priority, Priority::Low);
        assert_eq!(stage.status(), ApprovalStatus::Pending);
    }
}

// CONFIG TESTS
mod config_tests {
    use super::*;

    #[test]
    fn loads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approvals.toml");
        std::fs::write(&path, "reclaim_period_days = 15\nfile_root = \"/srv/files\"\n").unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.reclaim_period_days, 15);
        assert_eq!(config.file_root, std::path::PathBuf::from("/srv/files"));
        assert_eq!(config.payment_threshold, 100_000_000);
    }
}
