//! End-to-end policy behavior through the guard entry and the guarded
//! host operations.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::sync::Arc;
use std::thread;

use callguard_policy::config::{PolicyConfig, Properties};
use callguard_policy::engine::{DIRECT_SKIP, GUARDED_SKIP};
use callguard_policy::guarded;
use callguard_policy::stack::{Frame, StackWalker, ThreadStack};
use callguard_policy::{ConfigError, Guard, GuardError, PolicyEngine};
use callguard_types::well_known::{keys, modules};
use callguard_types::{Operation, Principal};

fn guard_from(pairs: &[(&str, &str)]) -> Guard {
    let props: Properties = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = PolicyConfig::from_properties(&props).unwrap();
    Guard::new(Arc::new(PolicyEngine::from_config(&config)))
}

fn as_module<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let _frame = ThreadStack.enter(Frame::module(name, format!("{}.Main.main", name)));
    f()
}

#[test]
fn test_default_deny_for_every_operation() {
    let guard = guard_from(&[]);
    for caller in ["app.x", "app.y"] {
        for op in Operation::ALL {
            let err = as_module(caller, || guard.check_permission(op.key())).unwrap_err();
            let denial = err.denial().expect("denied, not internal");
            assert_eq!(denial.operation, op);
            assert_eq!(denial.principal, Some(Principal::module(caller)));
        }
    }
}

#[test]
fn test_support_module_cannot_be_granted_as_caller() {
    let guard = guard_from(&[(keys::RUNTIME_EXIT_ALLOW, "module callguard.bootstrap")]);
    let err = as_module(modules::GUARD, || {
        guard.check_permission(Operation::RuntimeExit.key())
    })
    .unwrap_err();
    assert_eq!(err.denial().and_then(|d| d.principal.clone()), None);

    // Support frames above a real caller are passed over.
    let guard = guard_from(&[(keys::RUNTIME_EXIT_ALLOW, "module app.x")]);
    let result = as_module("app.x", || {
        as_module(modules::GUARD, || guard.check_permission(Operation::RuntimeExit.key()))
    });
    assert_eq!(result, Ok(()));
}

#[test]
fn test_grants_are_independent_per_operation() {
    for granted in Operation::ALL {
        let guard = guard_from(&[(granted.config_key(), "module app.x")]);
        for op in Operation::ALL {
            let from_x = as_module("app.x", || guard.check_permission(op.key()));
            let from_y = as_module("app.y", || guard.check_permission(op.key()));
            assert_eq!(from_x.is_ok(), op == granted, "{} granted, {} from x", granted, op);
            assert!(from_y.is_err(), "{} granted, {} from y", granted, op);
        }
    }
}

#[test]
fn test_config_validation_echoes_input() {
    let mut props = Properties::new();
    props.insert("callguard.system.foo.allow".into(), "module app.x".into());
    let err = PolicyConfig::from_properties(&props).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "callguard.system.foo.allow is not a valid key. Allowed keys are: {}",
            keys::ALL.join(", ")
        )
    );

    let mut props = Properties::new();
    props.insert(keys::SYSTEM_EXEC_ALLOW.into(), "m0dule org junit.platform.commons".into());
    let err = PolicyConfig::from_properties(&props).unwrap_err();
    assert!(matches!(err, ConfigError::MalformedPrincipal { .. }));
    assert_eq!(
        err.to_string(),
        "Not a valid module name: m0dule org junit.platform.commons"
    );
}

#[test]
fn test_exec_allowed_for_x_denied_for_y() {
    let guard = guard_from(&[(keys::SYSTEM_EXEC_ALLOW, "module app.x")]);

    let allowed = as_module("app.x", || {
        guarded::spawn(&guard, Command::new(std::env::current_exe().unwrap()).arg("--list"))
    });
    let status = allowed.unwrap().wait().unwrap();
    assert!(status.success());

    let denied = as_module("app.y", || {
        guarded::spawn(&guard, &mut Command::new("definitely-not-run"))
    })
    .unwrap_err();
    assert_eq!(
        denied.to_string(),
        "ProcessBuilder.start(...) not allowed for Module: app.y"
    );
}

#[test]
fn test_default_config_exit_is_denied_and_process_survives() {
    let guard = guard_from(&[]);
    for caller in ["app.x", "app.y"] {
        let err = as_module(caller, || guarded::exit(&guard, 1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Runtime.exit not allowed for Module: {}", caller)
        );
    }
    // Still here.
    assert_eq!(ThreadStack.depth(), 0);
}

#[test]
fn test_allowed_client_reaches_server() {
    let guard = guard_from(&[(keys::NETWORK_CONNECT_ALLOW, "module app.client")]);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut payload = String::new();
        stream.read_to_string(&mut payload).unwrap();
        payload
    });

    as_module("app.client", || {
        let mut stream = guarded::connect(&guard, addr).unwrap();
        stream.write_all(b"hello from app.client").unwrap();
    });

    assert_eq!(server.join().unwrap(), "hello from app.client");
}

#[test]
fn test_unknown_guard_key_is_not_a_denial() {
    let guard = guard_from(&[]);
    let err = as_module("app.x", || guard.check_permission("Thread.stop")).unwrap_err();
    assert!(matches!(err, GuardError::Internal(_)));
    assert!(err.denial().is_none());
}

/// The principal seen at each depth of a call chain through the guard.
#[test]
fn test_attribution_at_each_stack_depth() {
    let guard = guard_from(&[(keys::RUNTIME_EXIT_ALLOW, "module app.d1")]);
    let stack = ThreadStack;

    let _d0 = stack.enter(Frame::module("app.d0", "app.d0.Main.main"));
    let _d1 = stack.enter(Frame::module("app.d1", "app.d1.Service.stop"));
    let allowed = guard.check_permission(Operation::RuntimeExit.key());
    assert_eq!(allowed, Ok(()));

    {
        let _d2 = stack.enter(Frame::module("app.d2", "app.d2.Plugin.stop"));
        let err = guard
            .check_permission(Operation::RuntimeExit.key())
            .unwrap_err();
        assert_eq!(
            err.denial().and_then(|d| d.principal.clone()),
            Some(Principal::module("app.d2"))
        );

        // Runtime frames between the caller and the guard do not shift attribution.
        let _rt = stack.enter(Frame::runtime("java.lang.System.exit"));
        let err = guard
            .check_permission(Operation::RuntimeExit.key())
            .unwrap_err();
        assert_eq!(
            err.denial().and_then(|d| d.principal.clone()),
            Some(Principal::module("app.d2"))
        );
    }

    // Direct engine calls skip one frame fewer than calls through the guard.
    assert_eq!(GUARDED_SKIP.get() - DIRECT_SKIP.get(), 1);
    assert_eq!(
        guard.engine().check_permission(Operation::RuntimeExit),
        Ok(())
    );
}
