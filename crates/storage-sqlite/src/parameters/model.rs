use diesel::prelude::*;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::parameters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ParameterDB {
    pub scope: String,
    pub param_key: String,
    pub value: String,
    pub updated_at: String,
}
