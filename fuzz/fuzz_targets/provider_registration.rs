#![no_main]

use libfuzzer_sys::fuzz_target;
use wirebox::{DefaultScope, ProviderRegistry, Resolver};

#[derive(Debug)]
struct TestService {
    value: i32,
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let registry = ProviderRegistry::new();

    // First 4 bytes pick the registration pattern, next 4 the value.
    let pattern = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let value = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    match pattern % 5 {
        0 => {
            let _ = registry.add_singleton(TestService { value });
            if let Ok(container) = registry.container() {
                if let Ok(service) = container.get::<TestService>() {
                    assert_eq!(service.value, value);
                }
            }
        }
        1 => {
            let _ = registry
                .add_singleton_factory::<TestService, _, _>(move || TestService { value });
            if let Ok(container) = registry.container() {
                if let Ok(service) = container.get::<TestService>() {
                    assert_eq!(service.value, value);
                }
            }
        }
        2 => {
            let _ = registry
                .add_transient_factory::<TestService, _, _>(move || TestService { value });
            if let Ok(container) = registry.container() {
                let _ = container.get::<TestService>();
                let _ = container.get::<TestService>();
            }
        }
        3 => {
            let _ = registry.add_scoped_factory::<TestService, _, _>(
                DefaultScope::Request,
                move || TestService { value },
            );
            if let Ok(container) = registry.container() {
                // Scoped from the root must fail, never build.
                assert!(container.get::<TestService>().is_err());
                if let Ok(scope) = container.enter_scope() {
                    let _ = scope.get::<TestService>();
                    let _ = scope.close();
                }
            }
        }
        _ => {
            // Repeated overwrites must keep exactly one live registration.
            for i in 0..(pattern % 8) {
                let _ = registry.add_singleton(TestService {
                    value: value.wrapping_add(i as i32),
                });
            }
            if let Ok(container) = registry.container() {
                let _ = container.get::<TestService>();
            }
        }
    }
});
