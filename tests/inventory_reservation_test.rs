// ==========================================
// 库存预留集成测试
// ==========================================
// 职责: 验证 BOM 行添加/消耗/释放与库存预留的一致性
// ==========================================


#[cfg(test)]
mod inventory_reservation_test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use school_repair::api::ApiError;
    use school_repair::config::WorkOrderPolicy;
    use school_repair::domain::inventory::{AddBomLineRequest, StockKey};
    use school_repair::domain::types::WorkOrderStatus;
    use school_repair::domain::work_order::TenantScope;
    use school_repair::engine::{InventoryLedger, OperationContext, WorkOrderError};
    use school_repair::repository::{BomLineRepository, PartCompatibilityRepository};

    use crate::test_helpers::*;

    fn add_req(work_order_id: &str, part_id: &str, qty: i64) -> AddBomLineRequest {
        AddBomLineRequest {
            work_order_id: work_order_id.to_string(),
            part_id: part_id.to_string(),
            qty_planned: qty,
            override_compatibility: false,
        }
    }

    fn stock_key(part_id: &str) -> StockKey<'_> {
        StockKey {
            tenant_id: TENANT,
            service_location_id: LOCATION,
            part_id,
        }
    }

    // ==========================================
    // 典型场景: 10 → 预留10 → 再预留1失败 → 消耗4 → 释放6
    // ==========================================
    #[test]
    fn test_reserve_consume_release_scenario() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::InRepair));
        seed_work_order(&conn, &work_order("WO2", WorkOrderStatus::InRepair));
        seed_stock(&conn, "SCREEN-11", 10);

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let line = api.add_bom_line(&ctx, &scope, &add_req("WO1", "SCREEN-11", 10)).unwrap();
        let inv = api.get_inventory(TENANT, LOCATION, "SCREEN-11").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (10, 10));

        let err = api
            .add_bom_line(&ctx, &scope, &add_req("WO2", "SCREEN-11", 1))
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientStock(_)), "got {:?}", err);
        assert!(api.list_bom_lines(&scope, "WO2").unwrap().is_empty());

        let line = api.consume_bom_line(&ctx, &scope, &line.line_id, 4).unwrap();
        assert_eq!((line.qty_planned, line.qty_used), (10, 4));
        let inv = api.get_inventory(TENANT, LOCATION, "SCREEN-11").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (6, 6));

        let line = api.release_bom_line(&ctx, &scope, &line.line_id, 6).unwrap();
        assert_eq!((line.qty_planned, line.qty_used), (4, 4));
        assert!(line.is_resolved());
        let inv = api.get_inventory(TENANT, LOCATION, "SCREEN-11").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (6, 0));
    }

    // ==========================================
    // 不变量: 0 ≤ reserved ≤ available, 0 ≤ used ≤ planned
    // ==========================================
    #[test]
    fn test_invariants_hold_across_mixed_sequence() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::InRepair));
        seed_stock(&conn, "BATTERY-A", 5);

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let first = api.add_bom_line(&ctx, &scope, &add_req("WO1", "BATTERY-A", 3)).unwrap();
        let second = api.add_bom_line(&ctx, &scope, &add_req("WO1", "BATTERY-A", 2)).unwrap();

        // 每一步都可能成功或失败，但不变量必须始终成立
        let steps: Vec<(&str, &str, i64)> = vec![
            ("consume", first.line_id.as_str(), 2),
            ("consume", first.line_id.as_str(), 2),
            ("release", second.line_id.as_str(), 3),
            ("release", first.line_id.as_str(), 1),
            ("consume", second.line_id.as_str(), 2),
            ("consume", first.line_id.as_str(), 1),
            ("release", second.line_id.as_str(), 1),
        ];

        for (op, line_id, qty) in steps {
            let _ = match op {
                "consume" => api.consume_bom_line(&ctx, &scope, line_id, qty),
                _ => api.release_bom_line(&ctx, &scope, line_id, qty),
            };

            let inv = api.get_inventory(TENANT, LOCATION, "BATTERY-A").unwrap();
            assert!(inv.qty_reserved >= 0, "reserved < 0 after {} {}", op, qty);
            assert!(inv.qty_reserved <= inv.qty_available, "reserved > available after {} {}", op, qty);

            let lines = api.list_bom_lines(&scope, "WO1").unwrap();
            for line in &lines {
                assert!(line.qty_used >= 0 && line.qty_used <= line.qty_planned);
            }
            let open: i64 = lines.iter().map(|l| l.qty_open()).sum();
            assert_eq!(open, inv.qty_reserved, "open BOM quantity must equal reserved stock");
        }
    }

    #[test]
    fn test_over_consumption_and_over_release_are_rejected() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::InRepair));
        seed_stock(&conn, "KEYBOARD", 4);

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let line = api.add_bom_line(&ctx, &scope, &add_req("WO1", "KEYBOARD", 2)).unwrap();
        api.consume_bom_line(&ctx, &scope, &line.line_id, 1).unwrap();

        let err = api.consume_bom_line(&ctx, &scope, &line.line_id, 2).unwrap_err();
        assert!(matches!(err, ApiError::OverConsumption(_)));

        let err = api.release_bom_line(&ctx, &scope, &line.line_id, 2).unwrap_err();
        assert!(matches!(err, ApiError::ReleaseExceedsAvailable(_)));

        let err = api.consume_bom_line(&ctx, &scope, &line.line_id, 0).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let inv = api.get_inventory(TENANT, LOCATION, "KEYBOARD").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (3, 1));
    }

    #[test]
    fn test_add_line_requires_location_and_known_stock() {
        let (_tmp, conn) = create_test_db().unwrap();
        let mut no_location = work_order("WO1", WorkOrderStatus::InRepair);
        no_location.service_location_id = None;
        seed_work_order(&conn, &no_location);
        seed_work_order(&conn, &work_order("WO2", WorkOrderStatus::InRepair));

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let err = api.add_bom_line(&ctx, &scope, &add_req("WO1", "FAN", 1)).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        // 无库存行: 预留失败
        let err = api.add_bom_line(&ctx, &scope, &add_req("WO2", "FAN", 1)).unwrap_err();
        assert!(matches!(err, ApiError::ReservationConflict(_)), "got {:?}", err);
        assert!(api.list_bom_lines(&scope, "WO2").unwrap().is_empty());

        let err = api.add_bom_line(&ctx, &scope, &add_req("WO404", "FAN", 1)).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 兼容性校验
    // ==========================================
    #[test]
    fn test_incompatible_part_rejected_unless_overridden() {
        let (_tmp, conn) = create_test_db().unwrap();
        let mut wo = work_order("WO1", WorkOrderStatus::InRepair);
        wo.device_model = Some("CHROMEBOOK-11".to_string());
        seed_work_order(&conn, &wo);
        seed_stock(&conn, "SCREEN-13", 5);
        seed_stock(&conn, "SCREEN-11", 5);
        PartCompatibilityRepository::new(conn.clone())
            .add("SCREEN-11", "CHROMEBOOK-11")
            .unwrap();

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let err = api.add_bom_line(&ctx, &scope, &add_req("WO1", "SCREEN-13", 1)).unwrap_err();
        assert!(matches!(err, ApiError::IncompatiblePart(_)));
        let inv = api.get_inventory(TENANT, LOCATION, "SCREEN-13").unwrap();
        assert_eq!(inv.qty_reserved, 0);

        api.add_bom_line(&ctx, &scope, &add_req("WO1", "SCREEN-11", 1)).unwrap();

        let mut overridden = add_req("WO1", "SCREEN-13", 1);
        overridden.override_compatibility = true;
        api.add_bom_line(&ctx, &scope, &overridden).unwrap();

        // 策略关闭时不做校验
        let relaxed = build_api(
            &conn,
            WorkOrderPolicy {
                enforce_part_compatibility: false,
                ..Default::default()
            },
        );
        relaxed.add_bom_line(&ctx, &scope, &add_req("WO1", "SCREEN-13", 1)).unwrap();
        assert_eq!(api.list_bom_lines(&scope, "WO1").unwrap().len(), 3);
    }

    // ==========================================
    // 并发: 多线程争抢同一备件
    // ==========================================
    // 每个线程持有独立连接，争抢只能由库存 UPDATE 的条件判定
    #[test]
    fn test_concurrent_reservations_never_oversell() {
        let (tmp, conn) = create_test_db().unwrap();
        let workers = 8;
        for i in 0..workers {
            seed_work_order(&conn, &work_order(&format!("WO{}", i), WorkOrderStatus::InRepair));
        }
        seed_stock(&conn, "CHARGER", 3);

        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let own_conn = open_separate_connection(&tmp);
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let api = build_api(&own_conn, WorkOrderPolicy::default());
                    let ctx = OperationContext::new(format!("tech-{}", i));
                    let scope = TenantScope::tenant(TENANT);
                    barrier.wait();
                    api.add_bom_line(&ctx, &scope, &add_req(&format!("WO{}", i), "CHARGER", 1))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(ApiError::InsufficientStock(_))))
            .count();

        assert_eq!(succeeded, 3, "results: {:?}", results);
        assert_eq!(insufficient, workers - 3, "results: {:?}", results);

        let api = build_api(&conn, WorkOrderPolicy::default());
        let inv = api.get_inventory(TENANT, LOCATION, "CHARGER").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (3, 3));

        let scope = TenantScope::tenant(TENANT);
        let planned: i64 = (0..workers)
            .flat_map(|i| api.list_bom_lines(&scope, &format!("WO{}", i)).unwrap())
            .map(|line| line.qty_planned)
            .sum();
        assert_eq!(planned, 3);
    }

    #[test]
    fn test_only_one_of_two_racing_reservations_wins() {
        let (tmp, conn) = create_test_db().unwrap();
        seed_stock(&conn, "HINGE", 1);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let ledger = InventoryLedger::new(open_separate_connection(&tmp));
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let ctx = OperationContext::new(format!("tech-{}", i));
                    barrier.wait();
                    ledger.reserve(&ctx, stock_key("HINGE"), 1)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "results: {:?}", results);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(WorkOrderError::InsufficientStock { free: 0, .. }))));

        let record = InventoryLedger::new(conn.clone())
            .get(stock_key("HINGE"))
            .unwrap()
            .unwrap();
        assert_eq!(record.qty_reserved, 1);
    }

    // ==========================================
    // BOM行写入失败: 预留随事务回滚
    // ==========================================
    #[test]
    fn test_failed_line_insert_rolls_back_reservation() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::InRepair));
        seed_stock(&conn, "SCREEN-11", 5);
        conn.lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_part_insert BEFORE INSERT ON work_order_part
                 BEGIN SELECT RAISE(ABORT, 'part insert blocked'); END;",
            )
            .unwrap();

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        let err = api
            .add_bom_line(&ctx, &scope, &add_req("WO1", "SCREEN-11", 2))
            .unwrap_err();
        assert!(matches!(err, ApiError::ReservationConflict(_)), "got {:?}", err);
        assert_eq!(err.code(), "RESERVATION_CONFLICT");

        let inv = api.get_inventory(TENANT, LOCATION, "SCREEN-11").unwrap();
        assert_eq!((inv.qty_available, inv.qty_reserved), (5, 0));
        assert!(api.list_bom_lines(&scope, "WO1").unwrap().is_empty());
    }

    #[test]
    fn test_bom_lines_are_listed_per_work_order() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_work_order(&conn, &work_order("WO1", WorkOrderStatus::InRepair));
        seed_work_order(&conn, &work_order("WO2", WorkOrderStatus::InRepair));
        seed_stock(&conn, "RAM-8G", 10);

        let api = build_api(&conn, WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech-1");
        let scope = TenantScope::tenant(TENANT);

        api.add_bom_line(&ctx, &scope, &add_req("WO1", "RAM-8G", 2)).unwrap();
        api.add_bom_line(&ctx, &scope, &add_req("WO2", "RAM-8G", 3)).unwrap();

        let lines = BomLineRepository::new(conn.clone())
            .list_by_work_order(TENANT, "WO2")
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].qty_planned, 3);
        assert_eq!(api.list_bom_lines(&scope, "WO1").unwrap().len(), 1);
    }
}
