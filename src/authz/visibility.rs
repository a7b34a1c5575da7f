//! Visibility and feature-gate resolution
//!
//! Determines whether a principal can view a resource without holding any
//! membership, independent of role. Feature-level overrides can both widen
//! (a `Public` package registry on a private project) and narrow (a
//! `Disabled` feature on a public project) the resource-level setting.

use crate::model::{Feature, FeatureAccessLevel, Principal, Resource, Visibility};

/// Whether the principal may view metadata-level endpoints of this resource
/// without any membership.
///
/// When `feature` is given, the feature's own access level is consulted
/// first: `Public` grants anonymous access even on a private resource,
/// `Disabled` and `Private` refuse regardless of resource visibility.
pub fn can_view_without_membership(
    principal: &Principal,
    resource: &Resource,
    feature: Option<Feature>,
) -> bool {
    if let Some(feature) = feature {
        match resource.feature_level(feature) {
            FeatureAccessLevel::Disabled => return false,
            // Feature override outranks resource visibility in both
            // directions.
            FeatureAccessLevel::Public => return true,
            FeatureAccessLevel::Private => return false,
            FeatureAccessLevel::Enabled => {}
        }
    }

    match resource.visibility {
        Visibility::Public => true,
        Visibility::Internal => !principal.is_anonymous(),
        Visibility::Private => false,
    }
}

/// Whether the feature is shut off entirely for this resource.
pub fn feature_disabled(resource: &Resource, feature: Option<Feature>) -> bool {
    feature.is_some_and(|f| resource.feature_level(f) == FeatureAccessLevel::Disabled)
}
