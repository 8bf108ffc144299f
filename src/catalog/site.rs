//! Site hierarchy and product-family lookups
//!
//! These kinds are resolve-only: they exist so workflows can turn names into
//! the ids later calls need.

use declarative::{Endpoint, FieldPolicy, Pagination, ResourceDescriptor};

/// A site (area, building or floor) by its full name hierarchy.
pub fn site() -> ResourceDescriptor {
    ResourceDescriptor::new("site")
        .alias("site_v1")
        .identity(&["name_hierarchy"])
        .list(
            Endpoint::get("/dna/intent/api/v1/sites")
                .query_desired("nameHierarchy", "name_hierarchy"),
        )
        .paginate(Pagination::offset_limit(500))
        .field(FieldPolicy::new("name_hierarchy").wire("nameHierarchy").case_insensitive())
        .field(FieldPolicy::new("site_type").wire("type").read_only())
}

/// A product family, e.g. "Cisco Catalyst 9300 Switch".
pub fn product_name() -> ResourceDescriptor {
    ResourceDescriptor::new("product_name")
        .identity(&["product_name"])
        .list(Endpoint::get("/dna/intent/api/v1/productNames").query_desired("productName", "product_name"))
        .paginate(Pagination::offset_limit(500))
        .field(FieldPolicy::new("product_name").wire("productName").case_insensitive())
}
