use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_types::region::Region;

/// Loads the shared SDK config. An explicit region or profile wins; anything
/// left unset falls through to the SDK's default provider chains.
pub async fn configure_aws(
    region: Option<String>,
    profile: Option<String>,
) -> aws_types::SdkConfig {
    let region_provider =
        RegionProviderChain::first_try(region.map(Region::new)).or_default_provider();

    let mut loader =
        aws_config::defaults(BehaviorVersion::v2024_03_28()).region(region_provider);
    if let Some(profile) = profile {
        log::debug!("using shared config profile {}", profile);
        loader = loader.profile_name(profile);
    }

    loader.load().await
}
