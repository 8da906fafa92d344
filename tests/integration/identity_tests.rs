use anyhow::Result;
use std::collections::HashSet;

use semindex::indexer::{IdentityError, IdentityGenerator, IdentityKey, Md5IdentityGenerator};

#[test]
fn test_no_collisions_across_corpus() -> Result<()> {
    let projects = ["alpha", "beta", "gamma"];
    let mut seen = HashSet::new();
    let mut total = 0;

    for project in projects {
        for dir in 0..10 {
            for file in 0..10 {
                let path = format!("/srv/{}/src/mod_{}/file_{}.rs", project, dir, file);
                let id = Md5IdentityGenerator.generate(&IdentityKey::for_file(project, &path))?;
                seen.insert(id);
                total += 1;
            }
        }
    }

    assert_eq!(total, 300);
    assert_eq!(seen.len(), total);
    Ok(())
}

#[test]
fn test_same_path_in_different_projects() -> Result<()> {
    let path = "/srv/shared/README.md";
    let a = Md5IdentityGenerator.generate(&IdentityKey::for_file("one", path))?;
    let b = Md5IdentityGenerator.generate(&IdentityKey::for_file("two", path))?;

    assert_ne!(a, b);
    Ok(())
}

#[test]
fn test_stable_across_generator_instances() -> Result<()> {
    let key = IdentityKey::for_file("demo", "/srv/demo/a.txt").with("size_bytes", "5");
    let first = Md5IdentityGenerator.generate(&key)?;
    let second = Md5IdentityGenerator::default().generate(&key.clone().with("size_bytes", "9000"))?;

    // Only project and path feed the id when both are present
    assert_eq!(first, second);
    assert_eq!(first.to_uuid().as_bytes(), first.as_bytes());
    Ok(())
}

#[test]
fn test_empty_key_is_rejected() {
    let result = Md5IdentityGenerator.generate(&IdentityKey::new().with("project", ""));
    assert_eq!(result, Err(IdentityError::InsufficientIdentity));
}
