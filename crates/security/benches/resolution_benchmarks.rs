use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use std::sync::Arc;

use palisade_core::{ContainerId, Resource, ResourceId, SecurableResource};
use palisade_policy::MutablePolicy;
use palisade_principals::{Group, User};
use palisade_registry::{Permission, Role};
use palisade_security::SecurityService;

fn admin(service: &SecurityService) -> User {
    let p = service.principals().create_user("bench-admin").unwrap();
    let admin = User::new(p.id, p.name);
    service
        .add_member(&Group::administrators(), &admin.as_principal())
        .unwrap();
    admin
}

/// A user at the bottom of a membership chain of `depth` groups, with the
/// grant attached to the outermost group.
fn setup_chain(depth: usize) -> (SecurityService, User, Resource) {
    let service = SecurityService::in_memory().0;
    let admin = admin(&service);

    let p = service.principals().create_user("alice").unwrap();
    let alice = User::new(p.id, p.name);

    let mut groups = Vec::with_capacity(depth);
    for i in 0..depth {
        groups.push(service.create_group(&format!("G{i}"), None).unwrap());
    }
    for pair in groups.windows(2) {
        service
            .add_member(&pair[0], &pair[1].as_principal())
            .unwrap();
    }
    if let Some(innermost) = groups.last() {
        service
            .add_member(innermost, &alice.as_principal())
            .unwrap();
    }

    let resource = Resource::site(ResourceId::new());
    let mut policy = MutablePolicy::new(&resource);
    let grantee = groups.first().map(|g| g.id).unwrap_or(alice.id);
    policy.add_role_assignment(grantee, Role::Editor).unwrap();
    service.save_policy(&policy, &admin).unwrap();

    (service, alice, resource)
}

fn bench_permission_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_check");
    group.sample_size(1000);

    for depth in [1usize, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("nested_groups_warm_cache", depth),
            &depth,
            |b, &depth| {
                let (service, alice, resource) = setup_chain(depth);
                // Prime the closure and policy caches.
                service.has_all_permissions(&alice, &resource, &[Permission::Update]);

                b.iter(|| {
                    black_box(service.has_all_permissions(
                        black_box(&alice),
                        &resource,
                        &[Permission::Update],
                    ));
                });
            },
        );
    }

    group.finish();
}

fn bench_closure_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("closure_recompute");

    for depth in [4usize, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("cold_cache", depth),
            &depth,
            |b, &depth| {
                let (service, alice, resource) = setup_chain(depth);
                let ghost = service.create_group("Ghost", None).unwrap();
                let p = service.principals().create_user("churn").unwrap();
                let churn = User::new(p.id, p.name);

                let mut toggle = false;
                b.iter(|| {
                    // Any edge mutation clears the closure cache, so every
                    // resolution below recomputes the chain walk.
                    if toggle {
                        service.remove_member(&ghost, &churn.as_principal());
                    } else {
                        service
                            .add_member(&ghost, &churn.as_principal())
                            .unwrap();
                    }
                    toggle = !toggle;
                    black_box(service.has_all_permissions(
                        &alice,
                        &resource,
                        &[Permission::Update],
                    ));
                });
            },
        );
    }

    group.finish();
}

fn bench_inheritance_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("inheritance_walk");
    group.sample_size(1000);

    for depth in [1usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("resource_tree_depth", depth),
            &depth,
            |b, &depth| {
                let service = SecurityService::in_memory().0;
                let admin = admin(&service);
                let p = service.principals().create_user("alice").unwrap();
                let alice = User::new(p.id, p.name);

                let container = ContainerId::new();
                let mut current: Arc<dyn SecurableResource> =
                    Arc::new(Resource::container_root(container, None));

                let mut policy = MutablePolicy::new(current.as_ref());
                policy.add_role_assignment(alice.id, Role::Reader).unwrap();
                service.save_policy(&policy, &admin).unwrap();

                for _ in 0..depth {
                    current = Arc::new(Resource::child_of(
                        ResourceId::new(),
                        Some(container),
                        current,
                    ));
                }

                b.iter(|| {
                    black_box(service.has_all_permissions(
                        &alice,
                        current.as_ref(),
                        &[Permission::Read],
                    ));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_permission_check,
    bench_closure_recompute,
    bench_inheritance_walk
);
criterion_main!(benches);
