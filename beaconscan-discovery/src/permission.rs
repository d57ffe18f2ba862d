use async_trait::async_trait;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    AccessFineLocation,
}

/// Host permission system. Platforms without runtime grants report
/// `required() == false` and are never asked.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn required(&self) -> bool {
        true
    }
    async fn check(&self, permission: Permission) -> bool;
    async fn request(&self, permission: Permission) -> bool;
}

/// Desktop hosts grant BLE access without a runtime prompt.
#[derive(Default)]
pub struct HostPermissions;

#[async_trait]
impl PermissionProvider for HostPermissions {
    fn required(&self) -> bool {
        false
    }

    async fn check(&self, _: Permission) -> bool {
        true
    }

    async fn request(&self, _: Permission) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    NotRequired,
    AlreadyGranted,
    Accepted,
    Refused,
}

pub async fn check_location_permission(provider: &dyn PermissionProvider) -> PermissionOutcome {
    if !provider.required() {
        debug!("location permission not required on this host");
        return PermissionOutcome::NotRequired;
    }
    if provider.check(Permission::AccessFineLocation).await {
        info!("Permission is OK");
        PermissionOutcome::AlreadyGranted
    } else if provider.request(Permission::AccessFineLocation).await {
        info!("User accept");
        PermissionOutcome::Accepted
    } else {
        warn!("User refuse");
        PermissionOutcome::Refused
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{
        HostPermissions, Permission, PermissionOutcome, PermissionProvider,
        check_location_permission,
    };

    struct Scripted {
        granted: bool,
        accept: bool,
        requests: AtomicUsize,
    }

    impl Scripted {
        fn new(granted: bool, accept: bool) -> Self {
            Scripted {
                granted,
                accept,
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PermissionProvider for Scripted {
        async fn check(&self, _: Permission) -> bool {
            self.granted
        }

        async fn request(&self, _: Permission) -> bool {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.accept
        }
    }

    #[tokio::test]
    async fn host_does_not_ask() {
        assert_eq!(
            check_location_permission(&HostPermissions).await,
            PermissionOutcome::NotRequired
        );
    }

    #[tokio::test]
    async fn granted_skips_request() {
        let provider = Scripted::new(true, false);
        assert_eq!(
            check_location_permission(&provider).await,
            PermissionOutcome::AlreadyGranted
        );
        assert_eq!(provider.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn request_result_decides() {
        let accepting = Scripted::new(false, true);
        assert_eq!(
            check_location_permission(&accepting).await,
            PermissionOutcome::Accepted
        );
        let refusing = Scripted::new(false, false);
        assert_eq!(
            check_location_permission(&refusing).await,
            PermissionOutcome::Refused
        );
        assert_eq!(refusing.requests.load(Ordering::SeqCst), 1);
    }
}
