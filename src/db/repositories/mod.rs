pub mod family;
pub mod plant;
pub mod reward;

pub mod sql_fragment {
    pub const FAMILY_FIELDS: &str = r#"
        id,
        name,
        created_at,
        updated_at
    "#;

    pub const MEMBER_FIELDS: &str = r#"
        id,
        family_id,
        name,
        image,
        created_at,
        updated_at
    "#;

    pub const PLANT_FIELDS: &str = r#"
        id,
        family_id,
        kind,
        level,
        experience_point,
        nutrient_count,
        nutrient_active,
        created_at,
        updated_at
    "#;

    pub const REWARD_FIELDS: &str = r#"
        id,
        family_id,
        name,
        description,
        created_at
    "#;
}
