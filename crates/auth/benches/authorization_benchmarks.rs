use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use gatekeeper_auth::{
    AuthContext, PasswordHash, Permission, Principal, RoleDefinition, has_all_permissions,
    has_permission,
};

/// Principal holding `roles` roles of `perms_per_role` distinct codes each.
fn principal(roles: usize, perms_per_role: usize) -> Principal {
    let mut p = Principal::new("bench", PasswordHash::from_stored(""));
    p.roles = (0..roles)
        .map(|r| {
            RoleDefinition::new(
                format!("ROLE_{r}").as_str(),
                (0..perms_per_role).map(|i| format!("module{r}:perm{i}")),
            )
        })
        .collect();
    p
}

fn bench_context_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("auth_context_construction");

    for roles in [1usize, 5, 20] {
        let p = principal(roles, 10);
        group.bench_with_input(BenchmarkId::from_parameter(roles), &p, |b, p| {
            b.iter(|| AuthContext::from(black_box(p)));
        });
    }

    group.finish();
}

fn bench_permission_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_checks");
    let ctx = AuthContext::from(&principal(20, 10));

    let hit = Permission::new("module19:perm9");
    let miss = Permission::new("module99:perm0");
    group.bench_function("has_permission_hit", |b| {
        b.iter(|| has_permission(black_box(&ctx), black_box(&hit)));
    });
    group.bench_function("has_permission_miss", |b| {
        b.iter(|| has_permission(black_box(&ctx), black_box(&miss)));
    });

    let required: Vec<Permission> = (0..10)
        .map(|i| Permission::from(format!("module{i}:perm{i}")))
        .collect();
    group.bench_function("has_all_permissions_10", |b| {
        b.iter(|| has_all_permissions(black_box(&ctx), black_box(&required)));
    });

    group.finish();
}

criterion_group!(benches, bench_context_construction, bench_permission_checks);
criterion_main!(benches);
