#![no_main]

use libfuzzer_sys::fuzz_target;
use wirebox::{
    boxed, concrete, parameterized, var, GenericArg, Lifetime, ProviderRegistry, Resolver,
    ServiceKey, TypeKey,
};

struct Repo;
struct List;

fn arg_from(byte: u8, depth: u8) -> GenericArg {
    match byte % 4 {
        0 => concrete::<i32>(),
        1 => concrete::<String>(),
        2 if depth < 3 => parameterized(
            TypeKey::of::<List>(),
            vec![arg_from(byte.wrapping_mul(7), depth + 1)],
        ),
        _ => concrete::<u64>(),
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let registry = ProviderRegistry::new();
    let template = ServiceKey::of::<Repo>().with_args(vec![var("T")]);
    let nested = ServiceKey::of::<Repo>().with_args(vec![parameterized(
        TypeKey::of::<List>(),
        vec![var("U")],
    )]);

    let _ = registry.add_template(template, Lifetime::Transient, |_ctx, _b| Ok(boxed(1u8)));
    let _ = registry.add_template(nested, Lifetime::Transient, |_ctx, _b| Ok(boxed(1u8)));

    let container = match registry.container() {
        Ok(container) => container,
        Err(_) => return,
    };

    // Arbitrary closed request trees must never panic the matcher; they
    // either match a template or fail with a structured error.
    let args: Vec<GenericArg> = data[..data.len().min(3)]
        .iter()
        .map(|b| arg_from(*b, 0))
        .collect();
    let request = ServiceKey::of::<Repo>().with_args(args);
    let _ = container.get_keyed::<u8>(&request);
});
