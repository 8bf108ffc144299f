//! Software image management (SWIM)
//!
//! Tagging an image golden needs three ids the user rarely knows: the image
//! uuid, the site id and the product family ordinal. `image_golden_tag` is a
//! workflow that resolves each from a name and then reconciles the tag.

use declarative::{
    Completion, Endpoint, FieldPolicy, ResourceDescriptor, WorkflowStep,
};
use serde_json::json;

const IMAGES: &str = "/dna/intent/api/v1/images/{imageId}/sites/{siteId}";

/// An imported image, looked up by name.
pub fn swim_image() -> ResourceDescriptor {
    ResourceDescriptor::new("swim_image")
        .alias("swim_image_details")
        .identity(&["name"])
        .list(Endpoint::get("/dna/intent/api/v1/image/importation").query_desired("name", "name"))
        .field(FieldPolicy::new("image_id").wire("imageUuid").read_only())
}

/// Golden tag of one image for one product family at one site.
///
/// The status call answers for the exact triple, so no identity filtering is
/// needed; the tag exists when `taggedGolden` is true.
pub fn golden_tag() -> ResourceDescriptor {
    ResourceDescriptor::new("golden_tag")
        .identity(&["image_id", "site_id", "product_name_ordinal"])
        .get(
            Endpoint::get(format!(
                "{IMAGES}/productNames/{{ordinal}}/goldenTaggingStatus"
            ))
            .path_desired("imageId", "image_id")
            .path_desired("siteId", "site_id")
            .path_desired("ordinal", "product_name_ordinal"),
        )
        .create(
            Endpoint::post(format!("{IMAGES}/tagGolden"))
                .path_desired("imageId", "image_id")
                .path_desired("siteId", "site_id"),
        )
        .delete(
            Endpoint::post(format!("{IMAGES}/untagGolden"))
                .path_desired("imageId", "image_id")
                .path_desired("siteId", "site_id")
                .body_desired("productNameOrdinal", "product_name_ordinal"),
        )
        .field(FieldPolicy::new("image_id").read_only())
        .field(FieldPolicy::new("site_id").read_only())
        .field(FieldPolicy::new("product_name_ordinal").wire("productNameOrdinal").create_only())
        .exists_when("taggedGolden", json!(true))
        .completion(Completion::TaskId)
}

/// Tag an image golden by image name, site hierarchy and device family.
pub fn image_golden_tag() -> ResourceDescriptor {
    ResourceDescriptor::new("image_golden_tag")
        .alias("swim_image_golden_tag")
        .identity(&["image_name", "site_name", "device_family"])
        .step(
            WorkflowStep::new("resolveImage", "swim_image")
                .query()
                .from_desired("name", "image_name")
                .output("image_id", "image_id"),
        )
        .step(
            WorkflowStep::new("resolveSite", "site")
                .query()
                .from_desired("name_hierarchy", "site_name")
                .output("site_id", "id"),
        )
        .step(
            WorkflowStep::new("resolveProduct", "product_name")
                .query()
                .from_desired("product_name", "device_family")
                .output("ordinal", "productNameOrdinal"),
        )
        .step(
            WorkflowStep::new("tagGolden", "golden_tag")
                .from_output("image_id", "resolveImage", "image_id")
                .from_output("site_id", "resolveSite", "site_id")
                .from_output("product_name_ordinal", "resolveProduct", "ordinal"),
        )
}
