// ==========================================
// 工单策略配置测试
// ==========================================
// 职责: 验证 config_kv → WorkOrderPolicy 的加载与引擎生效
// ==========================================


#[cfg(test)]
mod config_policy_test {
    use school_repair::api::ApiError;
    use school_repair::app::AppState;
    use school_repair::config::{config_keys, ConfigManager};
    use school_repair::domain::rework::ReworkRequest;
    use school_repair::domain::types::{ReworkCategory, WorkOrderStatus};
    use school_repair::domain::work_order::TenantScope;
    use school_repair::engine::OperationContext;

    use crate::test_helpers::*;

    #[test]
    fn test_policy_from_config_drives_engines() {
        let (_tmp, conn) = create_test_db().unwrap();
        let config = ConfigManager::from_connection(conn.clone()).unwrap();
        config.set_global_config_value(config_keys::MAX_REWORK_COUNT, "1").unwrap();
        config.set_global_config_value(config_keys::REQUIRE_REWORK_REASON, "false").unwrap();
        config
            .set_global_config_value(config_keys::REWORK_EDGES, r#"{"QA": ["ASSIGNED"]}"#)
            .unwrap();

        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::Qa));

        let state = AppState::from_connection(conn.clone()).unwrap();
        assert_eq!(state.policy.max_rework_count, 1);
        assert!(!state.policy.require_rework_reason);

        let ctx = OperationContext::new("qa-lead");
        let scope = TenantScope::tenant(TENANT);
        let api = &state.work_order_api;

        // 覆盖后的逆向表不含 QA → IN_REPAIR
        let err = api
            .reject_for_rework(
                &ctx,
                &scope,
                "WO1",
                &ReworkRequest {
                    to_status: WorkOrderStatus::InRepair,
                    reason: None,
                    category: ReworkCategory::Other,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));

        let (wo, entry) = api
            .reject_for_rework(
                &ctx,
                &scope,
                "WO1",
                &ReworkRequest {
                    to_status: WorkOrderStatus::Assigned,
                    reason: None,
                    category: ReworkCategory::Other,
                },
            )
            .unwrap();
        assert_eq!(wo.status, WorkOrderStatus::Assigned);
        assert!(entry.reason.is_none());
    }

    #[test]
    fn test_malformed_config_value_fails_startup() {
        let (_tmp, conn) = create_test_db().unwrap();
        let config = ConfigManager::from_connection(conn.clone()).unwrap();
        config
            .set_global_config_value(config_keys::MAX_BULK_BATCH_SIZE, "lots")
            .unwrap();

        let err = AppState::from_connection(conn.clone()).err().unwrap();
        assert!(err.contains(config_keys::MAX_BULK_BATCH_SIZE), "got {}", err);
    }

    #[test]
    fn test_defaults_when_config_absent() {
        let (_tmp, conn) = create_test_db().unwrap();
        let policy = ConfigManager::from_connection(conn)
            .unwrap()
            .load_work_order_policy()
            .unwrap();
        assert!(policy.enforce_part_compatibility);
        assert_eq!(policy.max_rework_count, 3);
        assert!(policy.require_rework_reason);
        assert_eq!(policy.max_bulk_batch_size, 100);
        assert!(policy.rework_edges.is_none());
    }
}
