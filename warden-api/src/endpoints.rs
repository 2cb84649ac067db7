//! Backend endpoint resolution.

use warden_core::{Region, TargetEnv};

/// Resolve `(environment, region)` to the API base URL.
///
/// Prod is partitioned per region; Dev and QA share one host per
/// environment; Local maps each region to its own port for side-by-side
/// backends.
pub fn resolve_base_url(env: TargetEnv, region: Region) -> &'static str {
    match (env, region) {
        (TargetEnv::Local, Region::Na) => "http://localhost:3000",
        (TargetEnv::Local, Region::Eu) => "http://localhost:3001",
        (TargetEnv::Local, Region::Apac) => "http://localhost:3002",
        (TargetEnv::Dev, _) => "https://agent.dev.wardenhq.com",
        (TargetEnv::Qa, _) => "https://agent.qa.wardenhq.com",
        (TargetEnv::Prod, Region::Na) => "https://agent.wardenhq.com",
        (TargetEnv::Prod, Region::Eu) => "https://agent.eu.wardenhq.com",
        (TargetEnv::Prod, Region::Apac) => "https://agent.apac.wardenhq.com",
    }
}

/// Web application URL for the environment (shown in registration help).
pub fn web_app_url(env: TargetEnv) -> &'static str {
    match env {
        TargetEnv::Local => "http://localhost:5000",
        TargetEnv::Dev => "https://app.dev.wardenhq.com",
        TargetEnv::Qa => "https://app.qa.wardenhq.com",
        TargetEnv::Prod => "https://app.wardenhq.com",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TargetEnv::Prod, Region::Na, "https://agent.wardenhq.com")]
    #[case(TargetEnv::Prod, Region::Eu, "https://agent.eu.wardenhq.com")]
    #[case(TargetEnv::Prod, Region::Apac, "https://agent.apac.wardenhq.com")]
    #[case(TargetEnv::Dev, Region::Eu, "https://agent.dev.wardenhq.com")]
    #[case(TargetEnv::Qa, Region::Apac, "https://agent.qa.wardenhq.com")]
    #[case(TargetEnv::Local, Region::Eu, "http://localhost:3001")]
    fn resolves_environment_region_pairs(
        #[case] env: TargetEnv,
        #[case] region: Region,
        #[case] expected: &str,
    ) {
        assert_eq!(resolve_base_url(env, region), expected);
    }

    #[test]
    fn prod_regions_are_distinct_hosts() {
        let na = resolve_base_url(TargetEnv::Prod, Region::Na);
        let eu = resolve_base_url(TargetEnv::Prod, Region::Eu);
        let apac = resolve_base_url(TargetEnv::Prod, Region::Apac);
        assert_ne!(na, eu);
        assert_ne!(eu, apac);
        assert_ne!(na, apac);
    }
}
