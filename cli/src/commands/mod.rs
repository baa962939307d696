mod backup;
mod category;
mod helpers;
mod location;
mod product;

pub(crate) use backup::{
    ImportFlags, cmd_backup_clear, cmd_backup_export, cmd_backup_import, cmd_backup_validate,
};
pub(crate) use category::{
    cmd_category_add, cmd_category_defaults, cmd_category_delete, cmd_category_list,
    cmd_category_update,
};
pub(crate) use helpers::{json_error, parse_optional_date};
pub(crate) use location::{
    cmd_location_add, cmd_location_defaults, cmd_location_delete, cmd_location_list,
    cmd_location_update,
};
pub(crate) use product::{
    ProductChanges, cmd_product_add, cmd_product_delete, cmd_product_expired,
    cmd_product_expiring, cmd_product_list, cmd_product_show, cmd_product_stats,
    cmd_product_update,
};
