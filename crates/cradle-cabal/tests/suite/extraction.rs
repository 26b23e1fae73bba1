use cradle_cabal::{
    resolve_dependencies, resolve_flags, resolve_with, CabalError, ExtractedDependency,
    InstalledId, PackageIdentity, ParseError, SchemaVersion, SetupConfig, SetupConfigHeader,
    Version, ADAPTERS,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const NEWEST: &str = include_str!("../fixtures/newest.setup-config");
const MIDDLE: &str = include_str!("../fixtures/middle.setup-config");
const OLDEST: &str = include_str!("../fixtures/oldest.setup-config");
const CABAL_1_24: &str = include_str!("../fixtures/cabal-1.24.setup-config");

fn demo() -> PackageIdentity {
    "demo-0.1.0.0".parse().unwrap()
}

fn dep(installed: &str, package: &str) -> ExtractedDependency {
    ExtractedDependency {
        installed: InstalledId(installed.to_owned()),
        package: package.parse().unwrap(),
    }
}

fn flag_pairs(blob: &str) -> Vec<(String, bool)> {
    resolve_flags(blob).unwrap().into_iter().collect()
}

#[test]
fn newest_layout_dependencies() {
    let (schema, deps) = resolve_with(&ADAPTERS, NEWEST, &demo()).unwrap();
    assert_eq!(schema, SchemaVersion::Newest);
    assert_eq!(
        deps,
        vec![
            dep("base-4.9.1.0", "base-4.9.1.0"),
            dep("containers-0.5.7.1", "containers-0.5.7.1"),
            dep("text-1.2.2.1-4Ab9", "text-1.2.2.1"),
            dep("optparse-applicative-0.13.2.0", "optparse-applicative-0.13.2.0"),
            dep("hspec-2.4.3", "hspec-2.4.3"),
        ]
    );
}

#[test]
fn unit_ids_with_record_identities_use_the_newest_layout() {
    let (schema, deps) = resolve_with(&ADAPTERS, CABAL_1_24, &demo()).unwrap();
    assert_eq!(schema, SchemaVersion::Newest);
    let (_, expected) = resolve_with(&ADAPTERS, NEWEST, &demo()).unwrap();
    assert_eq!(deps, expected);
}

#[test]
fn middle_layout_dependencies() {
    let (schema, deps) = resolve_with(&ADAPTERS, MIDDLE, &demo()).unwrap();
    assert_eq!(schema, SchemaVersion::Middle);
    assert_eq!(
        deps,
        vec![
            dep("base-4.8.2.0-0d6d1084fbc041e1cded9228e80e264d", "base-4.8.2.0"),
            dep(
                "bytestring-0.10.6.0-18c05887c1aaac7adb3350f6a4c6c8ed",
                "bytestring-0.10.6.0"
            ),
        ]
    );
}

#[test]
fn oldest_layout_dependencies() {
    let (schema, deps) = resolve_with(&ADAPTERS, OLDEST, &demo()).unwrap();
    assert_eq!(schema, SchemaVersion::Oldest);
    let packages: Vec<String> = deps.iter().map(|d| d.package.to_string()).collect();
    assert_eq!(packages, vec!["base-4.6.0.1", "mtl-2.1.2", "HUnit-1.2.5.2"]);
}

#[test]
fn own_dependencies_exclude_the_package_named_in_the_header() {
    let setup = SetupConfig::from_text("dist/setup-config", MIDDLE);
    let deps = setup.own_dependencies().unwrap();
    assert_eq!(deps, resolve_dependencies(MIDDLE, &demo()).unwrap());
    assert!(deps.iter().all(|d| d.package.name != "demo"));

    let headless = SetupConfig::from_text("dist/setup-config", "LocalBuildInfo {}");
    let err = headless.own_dependencies().unwrap_err();
    assert!(
        matches!(
            err,
            CabalError::Parse {
                source: ParseError::Header { .. },
                ..
            }
        ),
        "{err}"
    );
}

#[test]
fn self_dependency_is_kept_for_a_different_version() {
    let other_version = PackageIdentity::new("demo", Version(vec![9, 9]));
    let deps = resolve_dependencies(NEWEST, &other_version).unwrap();
    assert!(
        deps.iter().any(|d| d.package == demo()),
        "expected the library dependency to survive: {deps:?}"
    );
}

#[test]
fn unknown_layout_reports_every_schema() {
    let blob = "Saved package config for demo-0.1.0.0 written by Cabal-3.0 using ghc-8.8\nLocalBuildInfo {componentGraph = []}";
    let err = resolve_dependencies(blob, &demo()).unwrap_err();
    let ParseError::NoSchemaMatched { failures } = &err else {
        panic!("unexpected error: {err}");
    };
    let schemas: Vec<SchemaVersion> = failures.iter().map(|f| f.schema).collect();
    assert_eq!(
        schemas,
        vec![
            SchemaVersion::Newest,
            SchemaVersion::Middle,
            SchemaVersion::Oldest
        ]
    );
    let text = err.to_string();
    assert!(text.contains("componentsConfigs"), "{text}");
    assert!(text.contains("libraryConfig"), "{text}");
}

#[test]
fn truncated_artifact_is_not_silently_accepted() {
    let cut = &NEWEST[..NEWEST.len() / 2];
    assert!(resolve_dependencies(cut, &demo()).is_err());

    let inside_flag_list = MIDDLE.find("configConfigurationsFlags").unwrap() + 40;
    let err = resolve_flags(&MIDDLE[..inside_flag_list]).unwrap_err();
    assert!(matches!(err, ParseError::Flags { .. }), "{err}");
}

#[test]
fn flags_survive_truncation_after_their_record() {
    let after_flags = MIDDLE.find("configConfigurationsFlags").unwrap() + 200;
    assert_eq!(
        flag_pairs(&MIDDLE[..after_flags]),
        vec![("fast".to_owned(), false)]
    );
}

#[test]
fn flags_from_every_layout() {
    assert_eq!(
        flag_pairs(NEWEST),
        vec![("fast".to_owned(), true), ("examples".to_owned(), false)]
    );
    assert_eq!(flag_pairs(MIDDLE), vec![("fast".to_owned(), false)]);
    assert_eq!(
        flag_pairs(OLDEST),
        vec![("fast".to_owned(), true), ("threaded".to_owned(), true)]
    );
}

#[test]
fn headers_name_the_package_and_toolchain() {
    for (blob, cabal) in [
        (NEWEST, "Cabal-2.0.0.2"),
        (CABAL_1_24, "Cabal-1.24.2.0"),
        (MIDDLE, "Cabal-1.22.8.0"),
        (OLDEST, "Cabal-1.16.0"),
    ] {
        let header = SetupConfigHeader::parse(blob).unwrap();
        assert_eq!(header.package, demo());
        assert_eq!(header.cabal.to_string(), cabal);
        assert_eq!(header.compiler.name, "ghc");
    }
}

fn render_newest(deps: &[(String, Vec<u64>)]) -> String {
    let pairs: Vec<String> = deps
        .iter()
        .map(|(name, version)| {
            let parts: Vec<String> = version.iter().map(u64::to_string).collect();
            format!(
                r#"(UnitId "{name}-{}",PackageIdentifier {{pkgName = PackageName "{name}", pkgVersion = Version [{}] []}})"#,
                parts.join("."),
                parts.join(",")
            )
        })
        .collect();
    format!(
        "LocalBuildInfo {{componentsConfigs = [(CLibName,LibComponentLocalBuildInfo {{componentPackageDeps = [{}]}},[])]}}",
        pairs.join(",")
    )
}

proptest! {
    #[test]
    fn resolved_dependencies_are_unique_and_exclude_self(
        deps in proptest::collection::vec(
            ("[a-c]{1,2}", proptest::collection::vec(0u64..3, 1..3)),
            0..12,
        ),
    ) {
        let own = PackageIdentity::new("a", Version(vec![1]));
        let blob = render_newest(&deps);
        let resolved = resolve_dependencies(&blob, &own).unwrap();

        prop_assert!(resolved.iter().all(|d| d.package != own));
        for (idx, d) in resolved.iter().enumerate() {
            prop_assert!(!resolved[..idx].contains(d), "duplicate {:?}", d);
        }

        let mut expected: Vec<PackageIdentity> = Vec::new();
        for (name, version) in &deps {
            let id = PackageIdentity::new(name.clone(), Version(version.clone()));
            if id != own && !expected.contains(&id) {
                expected.push(id);
            }
        }
        let got: Vec<PackageIdentity> = resolved.into_iter().map(|d| d.package).collect();
        prop_assert_eq!(got, expected);
    }
}
