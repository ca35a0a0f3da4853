//! Front-end adapter: argument validation and the single orchestrator call per invocation.

mod common;

use common::*;
use futures::future::{BoxFuture, FutureExt};
use proptest::prelude::*;
use std::sync::Mutex;

use lumia_deployer::invocation::validate_deploy_args;
use lumia_deployer::{
    dispatch, AutoDeployer, ByteSize, DeployArgs, DeploymentReport, DeploymentResult,
    InstallOptions, Invocation, InvocationError, OperationKind, OptionsProvider,
};

/// Records which operation was called and with what.
#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, operation: OperationKind) -> BoxFuture<'_, DeploymentResult> {
        self.calls.lock().unwrap().push(call);
        async move {
            Ok(DeploymentReport {
                operation,
                run_id: 1,
                completed_steps: Vec::new(),
                dual_boot: None,
            })
        }
        .boxed()
    }
}

impl AutoDeployer for CallLog {
    fn deploy(&self) -> BoxFuture<'_, DeploymentResult> {
        self.record("deploy".to_string(), OperationKind::Deploy)
    }

    fn deploy_with(&self, options: InstallOptions) -> BoxFuture<'_, DeploymentResult> {
        self.record(
            format!("deploy_with({})", options.image_index),
            OperationKind::Deploy,
        )
    }

    fn toggle_dual_boot(&self, enable: bool) -> BoxFuture<'_, DeploymentResult> {
        self.record(format!("toggle_dual_boot({})", enable), OperationKind::ToggleDualBoot)
    }

    fn install_gpu(&self) -> BoxFuture<'_, DeploymentResult> {
        self.record("install_gpu".to_string(), OperationKind::InstallGpu)
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push("cancel".to_string());
    }
}

fn image_file() -> tempfile::NamedTempFile {
    tempfile::Builder::new()
        .suffix(".wim")
        .tempfile()
        .expect("temp wim")
}

#[tokio::test]
async fn test_each_verb_makes_exactly_one_call() {
    let image = image_file();
    let cases = vec![
        (
            Invocation::Deploy(DeployArgs {
                wim: Some(image.path().to_path_buf()),
                index: Some(2),
                reserved_gb: Some(18.0),
            }),
            "deploy",
        ),
        (Invocation::EnableDualBoot, "toggle_dual_boot(true)"),
        (Invocation::DisableDualBoot, "toggle_dual_boot(false)"),
        (Invocation::InstallGpu, "install_gpu"),
    ];

    for (invocation, expected) in cases {
        let deployer = CallLog::default();
        let options = OptionsProvider::new();

        let result = dispatch(&deployer, &options, invocation)
            .await
            .expect("invocation accepted");

        assert!(result.is_ok());
        assert_eq!(deployer.calls(), vec![expected]);
    }
}

#[tokio::test]
async fn test_deploy_fills_the_options_provider_first() {
    let image = image_file();
    let deployer = CallLog::default();
    let options = OptionsProvider::new();

    dispatch(
        &deployer,
        &options,
        Invocation::Deploy(DeployArgs {
            wim: Some(image.path().to_path_buf()),
            index: Some(3),
            reserved_gb: Some(0.5),
        }),
    )
    .await
    .expect("invocation accepted")
    .expect("deploy");

    let stored = options.get().expect("options stored");
    assert_eq!(stored.image_path, image.path());
    assert_eq!(stored.image_index, 3);
    assert_eq!(stored.reserved_size.megabytes(), 512);
}

#[tokio::test]
async fn test_invalid_deploy_never_reaches_the_orchestrator() {
    let deployer = CallLog::default();
    let options = OptionsProvider::new();

    let err = dispatch(
        &deployer,
        &options,
        Invocation::Deploy(DeployArgs {
            wim: Some("/no/such/image.wim".into()),
            index: Some(-1),
            reserved_gb: Some(0.0),
        }),
    )
    .await
    .unwrap_err();

    let InvocationError::Invalid(ref messages) = err;
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Image file not found"));
    assert!(messages[1].contains("got -1"));
    assert!(deployer.calls().is_empty());
    assert!(!options.is_set());
}

#[tokio::test]
async fn test_dispatch_against_composed_deployer() {
    let h = harness();
    let orchestrator = h.deployer.orchestrator();
    let args = DeployArgs {
        wim: Some(h.image()),
        index: Some(1),
        reserved_gb: Some(18.0),
    };

    let report = dispatch(
        orchestrator.as_ref(),
        &h.deployer.services().options,
        Invocation::Deploy(args),
    )
    .await
    .expect("invocation accepted")
    .expect("deploy");

    assert_eq!(report.completed_steps.len(), 4);
    assert_eq!(h.device.calls(), vec![DETECT, BACKUP, APPLY, FINALIZE]);

    let report = dispatch(
        orchestrator.as_ref(),
        &h.deployer.services().options,
        Invocation::DisableDualBoot,
    )
    .await
    .expect("invocation accepted")
    .expect("toggle");
    assert!(!report.dual_boot.expect("change").changed());
}

#[test]
fn test_invocation_verbs() {
    assert_eq!(Invocation::Deploy(DeployArgs::default()).verb(), "deploy");
    assert_eq!(Invocation::EnableDualBoot.verb(), "enable-dual-boot");
    assert_eq!(Invocation::DisableDualBoot.verb(), "disable-dual-boot");
    assert_eq!(Invocation::InstallGpu.verb(), "install-gpu");
}

proptest! {
    #[test]
    fn prop_valid_arguments_always_validate(index in 1i64..=64, gb in 0.01f64..512.0) {
        let image = image_file();
        let args = DeployArgs {
            wim: Some(image.path().to_path_buf()),
            index: Some(index),
            reserved_gb: Some(gb),
        };

        let options = validate_deploy_args(&args).expect("valid arguments");
        prop_assert_eq!(options.image_index as i64, index);
        prop_assert_eq!(options.reserved_size, ByteSize::from_gigabytes(gb));
        prop_assert!(options.validate().is_ok());
    }

    #[test]
    fn prop_non_positive_values_are_rejected(index in -1000i64..=0, gb in -512.0f64..=0.0) {
        let image = image_file();
        let args = DeployArgs {
            wim: Some(image.path().to_path_buf()),
            index: Some(index),
            reserved_gb: Some(gb),
        };

        let messages = validate_deploy_args(&args).unwrap_err();
        prop_assert_eq!(messages.len(), 2);
    }
}
