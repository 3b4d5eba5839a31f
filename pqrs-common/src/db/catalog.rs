//! Built-in migration catalog
//!
//! Every correction older databases have ever needed, in the order they must
//! run: enum types, canonical tables, then per-table column additions with
//! their backfills, indexes and foreign keys, then label normalisation and
//! finally the opt-in enum casing repair.

use crate::db::canonical::{
    ENTITIES, ESTADO_META, ESTADO_PLAN, ESTADO_PQRS, MEDIO_RESPUESTA, METAS, PDM_ACTIVIDADES, PDM_AVANCES,
    PDM_META_ASSIGNMENTS, PLANES_INSTITUCIONALES, PQRS, TIPO_IDENTIFICACION, TIPO_SOLICITUD, USERS, USER_ROLE,
    USER_TYPE,
};
use crate::db::descriptor::{
    ColumnDescriptor as Col, ColumnType as T, DefaultValue as D, ForeignKeyConstraint, IndexDescriptor,
    OnDelete,
};
use crate::db::step::MigrationStep;

/// Tenant backfill target for rows created before multi-tenancy
const FIRST_ENTITY: D = D::Expr("(SELECT MIN(id) FROM entities)");

/// Entity created when tenant-less rows exist and no entity does
const DEFAULT_ENTITY: &[(&str, D)] = &[
    ("name", D::Text("Entidad Principal")),
    ("code", D::Text("DEFAULT")),
    ("slug", D::Text("entidad-principal")),
];

/// Rows that must end up owned by an entity
const TENANT_COLUMNS: &[(&str, &str)] = &[("pqrs", "entity_id"), ("planes_institucionales", "entity_id")];

/// Ordered catalog, including superseded entries
pub fn catalog() -> Vec<MigrationStep> {
    let mut steps = Vec::new();

    // Enum types first: PostgreSQL tables reference them
    steps.extend([
        MigrationStep::create_or_extend_enum("ensure_userrole_enum", &USER_ROLE),
        MigrationStep::create_or_extend_enum("ensure_usertype_enum", &USER_TYPE),
        MigrationStep::create_or_extend_enum("ensure_tiposolicitud_enum", &TIPO_SOLICITUD),
        MigrationStep::create_or_extend_enum("ensure_estadopqrs_enum", &ESTADO_PQRS),
        MigrationStep::create_or_extend_enum("ensure_tipoidentificacion_enum", &TIPO_IDENTIFICACION),
        MigrationStep::create_or_extend_enum("ensure_mediorespuesta_enum", &MEDIO_RESPUESTA),
        MigrationStep::create_or_extend_enum("ensure_estadoplan_enum", &ESTADO_PLAN),
        MigrationStep::create_or_extend_enum("ensure_estadometa_enum", &ESTADO_META),
    ]);

    steps.extend([
        MigrationStep::create_table("create_entities_table", &ENTITIES),
        MigrationStep::create_table("create_users_table", &USERS),
        MigrationStep::create_table("create_pqrs_table", &PQRS),
        MigrationStep::create_table("create_planes_institucionales_table", &PLANES_INSTITUCIONALES),
        MigrationStep::create_table("create_metas_table", &METAS),
        MigrationStep::create_table("create_pdm_meta_assignments_table", &PDM_META_ASSIGNMENTS),
        MigrationStep::create_table("create_pdm_avances_table", &PDM_AVANCES),
        MigrationStep::create_table("create_pdm_actividades_table", &PDM_ACTIVIDADES),
    ]);

    steps.extend(entity_steps());
    steps.extend(user_steps());
    steps.extend(pqrs_steps());
    steps.extend(plan_steps());
    steps.extend(tenant_backfill_steps());
    steps.extend(pdm_steps());

    steps.push(MigrationStep::repair_enum_casing(
        "repair_tiposolicitud_casing",
        &TIPO_SOLICITUD,
        "pqrs",
        "tipo_solicitud",
    ));

    steps
}

/// Catalog without superseded entries, in execution order
pub fn active_steps() -> Vec<MigrationStep> {
    catalog()
        .into_iter()
        .filter(|step| step.superseded_by.is_none())
        .collect()
}

fn entity_steps() -> Vec<MigrationStep> {
    let flag = |name: &'static str| Col::new(name, T::Boolean).not_null().default(D::Bool(true));
    vec![
        MigrationStep::add_column("add_nit_column", "entities", Col::new("nit", T::Varchar(50))),
        MigrationStep::create_index(
            "add_nit_index",
            "entities",
            IndexDescriptor { name: "ix_entities_nit", columns: &["nit"], unique: false },
        ),
        MigrationStep::add_column("add_entities_slug_column", "entities", Col::new("slug", T::Varchar(100))),
        MigrationStep::backfill("backfill_entities_slug", "entities", "slug", D::Expr("LOWER(code)")),
        MigrationStep::create_index(
            "add_entities_slug_index",
            "entities",
            IndexDescriptor { name: "ux_entities_slug", columns: &["slug"], unique: true },
        ),
        MigrationStep::add_column("add_entities_description_column", "entities", Col::new("description", T::Text)),
        MigrationStep::add_column("add_entities_address_column", "entities", Col::new("address", T::Varchar(300))),
        MigrationStep::add_column("add_entities_phone_column", "entities", Col::new("phone", T::Varchar(50))),
        MigrationStep::add_column("add_entities_email_column", "entities", Col::new("email", T::Varchar(150))),
        MigrationStep::add_column("add_entities_logo_url_column", "entities", Col::new("logo_url", T::Varchar(500))),
        MigrationStep::add_column("add_entities_is_active_column", "entities", flag("is_active")),
        MigrationStep::add_column("add_enable_pqrs_flag", "entities", flag("enable_pqrs")),
        MigrationStep::add_column("add_enable_users_admin_flag", "entities", flag("enable_users_admin")),
        MigrationStep::add_column("add_enable_reports_pdf_flag", "entities", flag("enable_reports_pdf")),
        MigrationStep::add_column("add_enable_ai_reports_flag", "entities", flag("enable_ai_reports")),
        MigrationStep::add_column(
            "add_enable_planes_institucionales_flag",
            "entities",
            flag("enable_planes_institucionales"),
        ),
        MigrationStep::add_column("add_enable_contratacion_flag", "entities", flag("enable_contratacion")),
        MigrationStep::backfill(
            "backfill_enable_contratacion_flag",
            "entities",
            "enable_contratacion",
            D::Bool(true),
        ),
        MigrationStep::add_column("add_enable_pdm_flag", "entities", flag("enable_pdm")),
        MigrationStep::backfill("backfill_enable_pdm_flag", "entities", "enable_pdm", D::Bool(true)),
    ]
}

fn user_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::add_column(
            "add_users_is_active_column",
            "users",
            Col::new("is_active", T::Boolean).not_null().default(D::Bool(true)),
        ),
        MigrationStep::add_column("add_users_secretaria_column", "users", Col::new("secretaria", T::Varchar(256))),
        MigrationStep::add_column("add_users_cedula_column", "users", Col::new("cedula", T::Varchar(20))),
        MigrationStep::add_column("add_users_telefono_column", "users", Col::new("telefono", T::Varchar(20))),
        MigrationStep::add_column("add_users_direccion_column", "users", Col::new("direccion", T::Varchar(255))),
        MigrationStep::create_index(
            "add_users_cedula_index",
            "users",
            IndexDescriptor { name: "idx_users_cedula", columns: &["cedula"], unique: false },
        ),
        MigrationStep::add_column("add_users_entity_id_column", "users", Col::new("entity_id", T::Integer)),
        MigrationStep::create_index(
            "add_users_entity_id_index",
            "users",
            IndexDescriptor { name: "ix_users_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::add_foreign_key(
            "add_users_entity_fk",
            "users",
            ForeignKeyConstraint {
                name: "fk_users_entity_id",
                column: "entity_id",
                ref_table: "entities",
                ref_column: "id",
                on_delete: OnDelete::SetNull,
            },
        ),
        MigrationStep::add_column("add_user_type_column", "users", Col::new("user_type", T::Enum(&USER_TYPE))),
        MigrationStep::add_column("add_allowed_modules_column", "users", Col::new("allowed_modules", T::Json)),
        MigrationStep::normalize_labels("normalize_user_type_labels", "users", "user_type", &USER_TYPE),
        MigrationStep::normalize_labels("normalize_user_role_labels", "users", "role", &USER_ROLE),
    ]
}

fn pqrs_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::add_column(
            "add_pqrs_tipo_identificacion_column",
            "pqrs",
            Col::new("tipo_identificacion", T::Enum(&TIPO_IDENTIFICACION)).default(D::Text("personal")),
        ),
        // Older PostgreSQL deployments defaulted to 'email'
        MigrationStep::add_column(
            "add_pqrs_medio_respuesta_email_default",
            "pqrs",
            Col::new("medio_respuesta", T::Enum(&MEDIO_RESPUESTA)).default(D::Text("email")),
        )
        .superseded_by("add_pqrs_medio_respuesta_column"),
        MigrationStep::add_column(
            "add_pqrs_medio_respuesta_column",
            "pqrs",
            Col::new("medio_respuesta", T::Enum(&MEDIO_RESPUESTA)).default(D::Text("ticket")),
        ),
        MigrationStep::add_column(
            "add_pqrs_telefono_ciudadano_column",
            "pqrs",
            Col::new("telefono_ciudadano", T::Varchar(20)),
        ),
        MigrationStep::add_column("add_pqrs_email_ciudadano_column", "pqrs", Col::new("email_ciudadano", T::Varchar(150))),
        MigrationStep::add_column(
            "add_pqrs_direccion_ciudadano_column",
            "pqrs",
            Col::new("direccion_ciudadano", T::Varchar(255)),
        ),
        MigrationStep::add_column("add_pqrs_fecha_delegacion_column", "pqrs", Col::new("fecha_delegacion", T::Timestamp)),
        MigrationStep::add_column("add_pqrs_fecha_respuesta_column", "pqrs", Col::new("fecha_respuesta", T::Timestamp)),
        MigrationStep::set_nullable("relax_pqrs_nombre_ciudadano", "pqrs", "nombre_ciudadano", true),
        MigrationStep::set_nullable("relax_pqrs_cedula_ciudadano", "pqrs", "cedula_ciudadano", true),
        MigrationStep::set_nullable("relax_pqrs_asunto", "pqrs", "asunto", true),
        MigrationStep::add_column("add_pqrs_entity_id_column", "pqrs", Col::new("entity_id", T::Integer)),
        MigrationStep::create_index(
            "add_pqrs_entity_id_index",
            "pqrs",
            IndexDescriptor { name: "idx_pqrs_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::add_foreign_key(
            "add_pqrs_entity_fk",
            "pqrs",
            ForeignKeyConstraint {
                name: "fk_pqrs_entity_id",
                column: "entity_id",
                ref_table: "entities",
                ref_column: "id",
                on_delete: OnDelete::Cascade,
            },
        ),
    ]
}

fn plan_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::add_column(
            "add_planes_entity_id_column",
            "planes_institucionales",
            Col::new("entity_id", T::Integer),
        ),
        MigrationStep::create_index(
            "add_planes_entity_id_index",
            "planes_institucionales",
            IndexDescriptor { name: "idx_planes_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::create_index(
            "add_planes_anio_index",
            "planes_institucionales",
            IndexDescriptor { name: "ix_planes_anio", columns: &["anio"], unique: false },
        ),
        MigrationStep::add_foreign_key(
            "add_planes_entity_fk",
            "planes_institucionales",
            ForeignKeyConstraint {
                name: "fk_planes_entity_id",
                column: "entity_id",
                ref_table: "entities",
                ref_column: "id",
                on_delete: OnDelete::Cascade,
            },
        ),
    ]
}

/// Both tenant columns exist before the default entity is decided, so one
/// entity covers orphans in either table
fn tenant_backfill_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::seed_parent_row("seed_default_entity", "entities", DEFAULT_ENTITY, TENANT_COLUMNS),
        MigrationStep::backfill("backfill_pqrs_entity_id", "pqrs", "entity_id", FIRST_ENTITY),
        MigrationStep::backfill(
            "backfill_planes_entity_id",
            "planes_institucionales",
            "entity_id",
            FIRST_ENTITY,
        ),
    ]
}

fn pdm_steps() -> Vec<MigrationStep> {
    let amount = |name: &'static str| Col::new(name, T::Float).not_null().default(D::Float(0.0));
    vec![
        MigrationStep::add_column("add_pdm_actividades_anio_column", "pdm_actividades", Col::new("anio", T::Integer)),
        MigrationStep::add_column(
            "add_pdm_actividades_meta_ejecutar_column",
            "pdm_actividades",
            amount("meta_ejecutar"),
        ),
        MigrationStep::add_column(
            "add_pdm_actividades_valor_ejecutado_column",
            "pdm_actividades",
            amount("valor_ejecutado"),
        ),
        MigrationStep::create_index(
            "add_metas_plan_id_index",
            "metas",
            IndexDescriptor { name: "ix_metas_plan_id", columns: &["plan_id"], unique: false },
        ),
        MigrationStep::create_index(
            "add_metas_responsable_index",
            "metas",
            IndexDescriptor { name: "ix_metas_responsable", columns: &["responsable"], unique: false },
        ),
        MigrationStep::create_index(
            "add_pdm_meta_assignments_entity_id_index",
            "pdm_meta_assignments",
            IndexDescriptor { name: "ix_pdm_meta_assignments_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::create_index(
            "add_pdm_meta_assignments_codigo_index",
            "pdm_meta_assignments",
            IndexDescriptor {
                name: "ix_pdm_meta_assignments_codigo",
                columns: &["codigo_indicador_producto"],
                unique: false,
            },
        ),
        MigrationStep::create_index(
            "add_pdm_avances_entity_id_index",
            "pdm_avances",
            IndexDescriptor { name: "ix_pdm_avances_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::create_index(
            "add_pdm_avances_codigo_index",
            "pdm_avances",
            IndexDescriptor { name: "ix_pdm_avances_codigo", columns: &["codigo_indicador_producto"], unique: false },
        ),
        MigrationStep::create_index(
            "add_pdm_actividades_entity_id_index",
            "pdm_actividades",
            IndexDescriptor { name: "ix_pdm_actividades_entity_id", columns: &["entity_id"], unique: false },
        ),
        MigrationStep::create_index(
            "add_pdm_actividades_codigo_index",
            "pdm_actividades",
            IndexDescriptor {
                name: "ix_pdm_actividades_codigo",
                columns: &["codigo_indicador_producto"],
                unique: false,
            },
        ),
    ]
}
