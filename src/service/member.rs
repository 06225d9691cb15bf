//! Member registration: a member save followed by a log save.

use tracing::{info, warn};

use crate::service::config::ServiceConfig;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::repository::{LogRepository, MemberRepository};
use crate::storage::{LogMessage, Member, RecordKey, RecordStore, StorageError};
use crate::transaction::{TransactionContext, TransactionDefinition, TransactionManager};

/// Registers members and records a log line for each registration.
pub struct MemberService {
    manager: TransactionManager,
    members: MemberRepository,
    logs: LogRepository,
    config: ServiceConfig,
}

impl MemberService {
    pub fn new(
        manager: TransactionManager,
        member_store: RecordStore<Member>,
        log_store: RecordStore<LogMessage>,
        config: ServiceConfig,
    ) -> Self {
        let members = if config.member_repository_transactional {
            MemberRepository::transactional(member_store, manager.clone(), "MemberRepository.save")
        } else {
            MemberRepository::plain(member_store, manager.clone())
        };
        let logs = if config.log_repository_transactional {
            LogRepository::transactional(log_store, manager.clone(), "LogRepository.save")
        } else {
            LogRepository::plain(log_store, manager.clone())
        };

        Self {
            manager,
            members,
            logs,
            config,
        }
    }

    /// Save the member, then the log message. A log failure propagates.
    ///
    /// When the service is transactional both saves share one physical
    /// transaction, so a log failure leaves neither record behind.
    pub fn join_v1(&self, ctx: &TransactionContext, username: &str) -> ServiceResult<()> {
        let key = RecordKey::new(username).map_err(StorageError::from)?;

        self.boundary(ctx, "MemberService.join_v1", |ctx| {
            let member = Member::new(key.clone());
            let log = LogMessage::new(key.clone());

            info!(%key, "member repository call started");
            self.members.save(ctx, member)?;
            info!(%key, "member repository call finished");

            info!(%key, "log repository call started");
            self.logs.save(ctx, log)?;
            info!(%key, "log repository call finished");
            Ok(())
        })
    }

    /// Same as [`join_v1`](Self::join_v1), but a failed log save is caught
    /// and the method carries on as if nothing happened.
    ///
    /// Catching the failure does not undo the rollback-only mark a joined log
    /// participant left on the shared transaction: the service's own commit
    /// then fails with `UnexpectedRollback`.
    pub fn join_v2(&self, ctx: &TransactionContext, username: &str) -> ServiceResult<()> {
        let key = RecordKey::new(username).map_err(StorageError::from)?;

        self.boundary(ctx, "MemberService.join_v2", |ctx| {
            let member = Member::new(key.clone());
            let log = LogMessage::new(key.clone());

            info!(%key, "member repository call started");
            self.members.save(ctx, member)?;
            info!(%key, "member repository call finished");

            info!(%key, "log repository call started");
            match self.logs.save(ctx, log) {
                Ok(_) => {}
                Err(e) if e.is_store_failure() => {
                    warn!(%key, error = %e, "failed to save log message, returning normally");
                }
                Err(e) => return Err(e),
            }
            info!(%key, "log repository call finished");
            Ok(())
        })
    }

    pub fn member_repository(&self) -> &MemberRepository {
        &self.members
    }

    pub fn log_repository(&self) -> &LogRepository {
        &self.logs
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn boundary<F>(&self, ctx: &TransactionContext, name: &str, f: F) -> ServiceResult<()>
    where
        F: FnOnce(&TransactionContext) -> Result<(), ServiceError>,
    {
        if self.config.service_transactional {
            let definition = TransactionDefinition::required().named(name);
            self.manager.execute(ctx, &definition, f)
        } else {
            f(ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::config::DEFAULT_FAILURE_MARKER;
    use crate::storage::FailureTrigger;
    use crate::transaction::TransactionError;

    struct Fixture {
        manager: TransactionManager,
        service: MemberService,
    }

    impl Fixture {
        fn new(config: ServiceConfig) -> Self {
            let manager = TransactionManager::new();
            let log_store = RecordStore::new("log")
                .with_failure(FailureTrigger::Contains(DEFAULT_FAILURE_MARKER.to_string()));
            let service = MemberService::new(
                manager.clone(),
                RecordStore::new("member"),
                log_store,
                config,
            );
            Self { manager, service }
        }

        fn member_present(&self, username: &str) -> bool {
            let key = RecordKey::new(username).unwrap();
            self.service.member_repository().find(&key).is_some()
        }

        fn log_present(&self, username: &str) -> bool {
            let key = RecordKey::new(username).unwrap();
            self.service.log_repository().find(&key).is_some()
        }
    }

    #[test]
    fn test_outer_tx_off_success() {
        let fx = Fixture::new(ServiceConfig::outer_tx_off());
        let ctx = TransactionContext::new();

        fx.service.join_v1(&ctx, "outer_tx_off_success").unwrap();

        assert!(fx.member_present("outer_tx_off_success"));
        assert!(fx.log_present("outer_tx_off_success"));
        let stats = fx.manager.stats();
        assert_eq!(stats.begun, 2);
        assert_eq!(stats.committed, 2);
    }

    #[test]
    fn test_outer_tx_off_fail() {
        let fx = Fixture::new(ServiceConfig::outer_tx_off());
        let ctx = TransactionContext::new();
        let username = "log-exception_outer_tx_off_fail";

        let err = fx.service.join_v1(&ctx, username).unwrap_err();
        assert!(err.is_store_failure());

        // The member transaction had already committed on its own.
        assert!(fx.member_present(username));
        assert!(!fx.log_present(username));
    }

    #[test]
    fn test_single_tx() {
        let fx = Fixture::new(ServiceConfig::single_tx());
        let ctx = TransactionContext::new();

        fx.service.join_v1(&ctx, "single_tx").unwrap();

        assert!(fx.member_present("single_tx"));
        assert!(fx.log_present("single_tx"));
        let stats = fx.manager.stats();
        assert_eq!(stats.begun, 1);
        assert_eq!(stats.joined, 0);
        assert_eq!(stats.committed, 1);
    }

    #[test]
    fn test_outer_tx_on_success() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();

        fx.service.join_v1(&ctx, "outer_tx_on_success").unwrap();

        assert!(fx.member_present("outer_tx_on_success"));
        assert!(fx.log_present("outer_tx_on_success"));
        let stats = fx.manager.stats();
        assert_eq!(stats.begun, 1);
        assert_eq!(stats.joined, 2);
        assert_eq!(stats.physical_ends(), 1);
    }

    #[test]
    fn test_outer_tx_on_fail() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();
        let username = "log-exception_outer_tx_on_fail";

        let err = fx.service.join_v1(&ctx, username).unwrap_err();
        assert!(err.is_store_failure());
        assert!(!err.is_unexpected_rollback());

        assert!(!fx.member_present(username));
        assert!(!fx.log_present(username));
        assert_eq!(fx.manager.stats().rolled_back, 1);
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_recover_exception_fail() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();
        let username = "log-exception_recover_exception_fail";

        let err = fx.service.join_v2(&ctx, username).unwrap_err();
        assert!(err.is_unexpected_rollback());
        assert!(matches!(
            err,
            ServiceError::Transaction(TransactionError::UnexpectedRollback { .. })
        ));

        assert!(!fx.member_present(username));
        assert!(!fx.log_present(username));
        assert_eq!(fx.manager.stats().unexpected_rollbacks, 1);
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_recover_exception_without_outer_transaction() {
        let fx = Fixture::new(ServiceConfig::outer_tx_off());
        let ctx = TransactionContext::new();
        let username = "log-exception_recover_exception_success";

        fx.service.join_v2(&ctx, username).unwrap();

        assert!(fx.member_present(username));
        assert!(!fx.log_present(username));
    }

    #[test]
    fn test_recover_exception_with_plain_log_repository() {
        // The log store fails before anything is staged and no participant
        // boundary is crossed, so nothing marks the transaction.
        let fx = Fixture::new(ServiceConfig::outer_tx_on().log_repository_transactional(false));
        let ctx = TransactionContext::new();
        let username = "log-exception_plain_log";

        fx.service.join_v2(&ctx, username).unwrap();

        assert!(fx.member_present(username));
        assert!(!fx.log_present(username));
    }

    #[test]
    fn test_member_visible_inside_doomed_transaction() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();
        let key = RecordKey::new("log-exception_inside").unwrap();
        let members = fx.service.member_repository();
        let logs = fx.service.log_repository();

        let result: ServiceResult<()> = fx.manager.with_transaction(&ctx, |ctx| {
            members.save(ctx, Member::new(key.clone()))?;
            assert!(logs.save(ctx, LogMessage::new(key.clone())).is_err());

            assert!(ctx.is_rollback_only());
            assert!(members.find_in(ctx, &key).is_some());
            assert!(logs.find_in(ctx, &key).is_none());
            Ok(())
        });

        assert!(result.unwrap_err().is_unexpected_rollback());
        assert!(members.find(&key).is_none());
        assert!(logs.find(&key).is_none());
    }

    #[test]
    fn test_keyed_failure_scenario() {
        let manager = TransactionManager::new();
        let log_store = RecordStore::new("log");
        let service = MemberService::new(
            manager,
            RecordStore::new("member"),
            log_store.clone(),
            ServiceConfig::outer_tx_on(),
        );
        let ctx = TransactionContext::new();
        let find = |username: &str| {
            let key = RecordKey::new(username).unwrap();
            (
                service.member_repository().find(&key).is_some(),
                service.log_repository().find(&key).is_some(),
            )
        };

        service.join_v1(&ctx, "u1").unwrap();
        assert_eq!(find("u1"), (true, true));

        log_store.set_failure(Some(FailureTrigger::Key(RecordKey::new("u2").unwrap())));
        assert!(service.join_v1(&ctx, "u2").unwrap_err().is_store_failure());
        assert_eq!(find("u2"), (false, false));

        log_store.set_failure(Some(FailureTrigger::Key(RecordKey::new("u3").unwrap())));
        assert!(service.join_v2(&ctx, "u3").unwrap_err().is_unexpected_rollback());
        assert_eq!(find("u3"), (false, false));

        // The context is reusable after every terminal state.
        log_store.set_failure(None);
        service.join_v2(&ctx, "u4").unwrap();
        assert_eq!(find("u4"), (true, true));
    }

    #[test]
    fn test_join_runs_inside_caller_transaction() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();

        let result: ServiceResult<()> = fx.manager.with_transaction(&ctx, |ctx| {
            fx.service.join_v1(ctx, "caller_a")?;
            fx.service.join_v1(ctx, "caller_b")?;
            assert!(!fx.member_present("caller_a"));
            Ok(())
        });

        result.unwrap();
        assert!(fx.member_present("caller_a"));
        assert!(fx.log_present("caller_b"));
        let stats = fx.manager.stats();
        assert_eq!(stats.begun, 1);
        assert_eq!(stats.physical_ends(), 1);
    }

    #[test]
    fn test_invalid_username_is_rejected() {
        let fx = Fixture::new(ServiceConfig::outer_tx_on());
        let ctx = TransactionContext::new();

        let err = fx.service.join_v1(&ctx, "").unwrap_err();
        assert!(matches!(err, ServiceError::Storage(StorageError::InvalidKey(_))));
        assert_eq!(fx.manager.stats().begun, 0);
    }
}
