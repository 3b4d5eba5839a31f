//! Canonical target schema
//!
//! Single source of truth for the tables and enum types the application
//! expects. Older databases are reconciled toward this shape by the step
//! catalog in [`crate::db::catalog`].

use crate::db::descriptor::{
    ColumnDescriptor as Col, ColumnType as T, DefaultValue as D, EnumDescriptor,
    ForeignKeyConstraint, IndexDescriptor, OnDelete, TableDescriptor, UniqueConstraint,
};

/// Role with every privilege; the only role reseed creates
pub const HIGHEST_PRIVILEGE_ROLE: &str = "superadmin";

// ----------------------------------------------------------------------------
// Enum types
// ----------------------------------------------------------------------------

pub static USER_ROLE: EnumDescriptor =
    EnumDescriptor::new("userrole", &["superadmin", "admin", "secretario", "ciudadano"]);

pub static USER_TYPE: EnumDescriptor = EnumDescriptor::new("usertype", &["secretario", "contratista"]);

pub static TIPO_SOLICITUD: EnumDescriptor = EnumDescriptor::new(
    "tiposolicitud",
    &["peticion", "queja", "reclamo", "sugerencia"],
);

pub static ESTADO_PQRS: EnumDescriptor = EnumDescriptor::new(
    "estadopqrs",
    &["pendiente", "en_proceso", "resuelto", "cerrado"],
);

pub static TIPO_IDENTIFICACION: EnumDescriptor =
    EnumDescriptor::new("tipoidentificacion", &["personal", "anonima"]);

pub static MEDIO_RESPUESTA: EnumDescriptor = EnumDescriptor::new(
    "mediorespuesta",
    &["email", "fisica", "telefono", "ticket"],
);

pub static ESTADO_PLAN: EnumDescriptor =
    EnumDescriptor::new("estadoplan", &["activo", "finalizado", "suspendido"]);

pub static ESTADO_META: EnumDescriptor = EnumDescriptor::new(
    "estadometa",
    &["no_iniciada", "en_progreso", "completada", "atrasada"],
);

/// Every enum type, in creation order
pub static ENUMS: &[&EnumDescriptor] = &[
    &USER_ROLE,
    &USER_TYPE,
    &TIPO_SOLICITUD,
    &ESTADO_PQRS,
    &TIPO_IDENTIFICACION,
    &MEDIO_RESPUESTA,
    &ESTADO_PLAN,
    &ESTADO_META,
];

// ----------------------------------------------------------------------------
// Tables
// ----------------------------------------------------------------------------

/// Tenant (government entity)
pub static ENTITIES: TableDescriptor = TableDescriptor {
    name: "entities",
    columns: &[
        Col::id(),
        Col::new("name", T::Varchar(200)).not_null().unique(),
        Col::new("code", T::Varchar(50)).not_null().unique(),
        Col::new("slug", T::Varchar(100)),
        Col::new("nit", T::Varchar(50)),
        Col::new("description", T::Text),
        Col::new("address", T::Varchar(300)),
        Col::new("phone", T::Varchar(50)),
        Col::new("email", T::Varchar(150)),
        Col::new("logo_url", T::Varchar(500)),
        Col::new("is_active", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_pqrs", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_users_admin", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_reports_pdf", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_ai_reports", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_planes_institucionales", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_contratacion", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("enable_pdm", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp),
    ],
    uniques: &[],
    foreign_keys: &[],
    indexes: &[
        IndexDescriptor { name: "ux_entities_slug", columns: &["slug"], unique: true },
        IndexDescriptor { name: "ix_entities_nit", columns: &["nit"], unique: false },
    ],
};

/// Staff and citizen accounts
pub static USERS: TableDescriptor = TableDescriptor {
    name: "users",
    columns: &[
        Col::id(),
        Col::new("username", T::Varchar(100)).not_null().unique(),
        Col::new("email", T::Varchar(150)).not_null().unique(),
        Col::new("full_name", T::Varchar(200)).not_null(),
        Col::new("hashed_password", T::Text).not_null(),
        Col::new("role", T::Enum(&USER_ROLE)).not_null().default(D::Text("secretario")),
        Col::new("user_type", T::Enum(&USER_TYPE)),
        Col::new("allowed_modules", T::Json),
        Col::new("secretaria", T::Varchar(256)),
        Col::new("entity_id", T::Integer),
        Col::new("cedula", T::Varchar(20)),
        Col::new("telefono", T::Varchar(20)),
        Col::new("direccion", T::Varchar(255)),
        Col::new("is_active", T::Boolean).not_null().default(D::Bool(true)),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp),
    ],
    uniques: &[],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_users_entity_id",
        column: "entity_id",
        ref_table: "entities",
        ref_column: "id",
        on_delete: OnDelete::SetNull,
    }],
    indexes: &[
        IndexDescriptor { name: "idx_users_cedula", columns: &["cedula"], unique: false },
        IndexDescriptor { name: "ix_users_entity_id", columns: &["entity_id"], unique: false },
    ],
};

/// Citizen petitions, complaints, claims and suggestions
pub static PQRS: TableDescriptor = TableDescriptor {
    name: "pqrs",
    columns: &[
        Col::id(),
        Col::new("numero_radicado", T::Varchar(50)).not_null().unique(),
        Col::new("entity_id", T::Integer),
        Col::new("tipo_identificacion", T::Enum(&TIPO_IDENTIFICACION)).default(D::Text("personal")),
        Col::new("medio_respuesta", T::Enum(&MEDIO_RESPUESTA)).default(D::Text("ticket")),
        Col::new("nombre_ciudadano", T::Varchar(200)),
        Col::new("cedula_ciudadano", T::Varchar(20)),
        Col::new("telefono_ciudadano", T::Varchar(20)),
        Col::new("email_ciudadano", T::Varchar(150)),
        Col::new("direccion_ciudadano", T::Varchar(255)),
        Col::new("tipo_solicitud", T::Enum(&TIPO_SOLICITUD)).not_null().default(D::Text("peticion")),
        Col::new("asunto", T::Varchar(300)),
        Col::new("descripcion", T::Text).not_null(),
        Col::new("estado", T::Enum(&ESTADO_PQRS)).not_null().default(D::Text("pendiente")),
        Col::new("fecha_solicitud", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("fecha_cierre", T::Timestamp),
        Col::new("fecha_delegacion", T::Timestamp),
        Col::new("fecha_respuesta", T::Timestamp),
        Col::new("created_by_id", T::Integer),
        Col::new("assigned_to_id", T::Integer),
        Col::new("respuesta", T::Text),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp),
    ],
    uniques: &[],
    foreign_keys: &[
        ForeignKeyConstraint {
            name: "fk_pqrs_entity_id",
            column: "entity_id",
            ref_table: "entities",
            ref_column: "id",
            on_delete: OnDelete::Cascade,
        },
        ForeignKeyConstraint {
            name: "fk_pqrs_created_by_id",
            column: "created_by_id",
            ref_table: "users",
            ref_column: "id",
            on_delete: OnDelete::SetNull,
        },
        ForeignKeyConstraint {
            name: "fk_pqrs_assigned_to_id",
            column: "assigned_to_id",
            ref_table: "users",
            ref_column: "id",
            on_delete: OnDelete::SetNull,
        },
    ],
    indexes: &[IndexDescriptor { name: "idx_pqrs_entity_id", columns: &["entity_id"], unique: false }],
};

/// Institutional plans per entity and year
pub static PLANES_INSTITUCIONALES: TableDescriptor = TableDescriptor {
    name: "planes_institucionales",
    columns: &[
        Col::id(),
        Col::new("nombre", T::Varchar(200)).not_null(),
        Col::new("descripcion", T::Text).not_null(),
        Col::new("anio", T::Integer).not_null(),
        Col::new("fecha_inicio", T::Timestamp).not_null(),
        Col::new("fecha_fin", T::Timestamp).not_null(),
        Col::new("estado", T::Enum(&ESTADO_PLAN)).not_null().default(D::Text("activo")),
        Col::new("entity_id", T::Integer),
    ],
    uniques: &[],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_planes_entity_id",
        column: "entity_id",
        ref_table: "entities",
        ref_column: "id",
        on_delete: OnDelete::Cascade,
    }],
    indexes: &[
        IndexDescriptor { name: "idx_planes_entity_id", columns: &["entity_id"], unique: false },
        IndexDescriptor { name: "ix_planes_anio", columns: &["anio"], unique: false },
    ],
};

/// Goals of an institutional plan
pub static METAS: TableDescriptor = TableDescriptor {
    name: "metas",
    columns: &[
        Col::id(),
        Col::new("nombre", T::Varchar(200)).not_null(),
        Col::new("descripcion", T::Text).not_null(),
        Col::new("indicador", T::Varchar(200)).not_null(),
        Col::new("meta_numerica", T::Float).not_null(),
        Col::new("avance_actual", T::Float).not_null().default(D::Float(0.0)),
        Col::new("fecha_inicio", T::Timestamp).not_null(),
        Col::new("fecha_fin", T::Timestamp).not_null(),
        Col::new("responsable", T::Varchar(200)).not_null(),
        Col::new("estado", T::Enum(&ESTADO_META)).not_null().default(D::Text("no_iniciada")),
        Col::new("resultado", T::Text),
        Col::new("plan_id", T::Integer).not_null(),
    ],
    uniques: &[],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_metas_plan_id",
        column: "plan_id",
        ref_table: "planes_institucionales",
        ref_column: "id",
        on_delete: OnDelete::Cascade,
    }],
    indexes: &[
        IndexDescriptor { name: "ix_metas_plan_id", columns: &["plan_id"], unique: false },
        IndexDescriptor { name: "ix_metas_responsable", columns: &["responsable"], unique: false },
    ],
};

pub static PDM_META_ASSIGNMENTS: TableDescriptor = TableDescriptor {
    name: "pdm_meta_assignments",
    columns: &[
        Col::id(),
        Col::new("entity_id", T::Integer).not_null(),
        Col::new("codigo_indicador_producto", T::Varchar(128)).not_null(),
        Col::new("secretaria", T::Varchar(256)),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp).default(D::CurrentTimestamp),
    ],
    uniques: &[UniqueConstraint {
        name: "uq_meta_assignment_entity_codigo",
        columns: &["entity_id", "codigo_indicador_producto"],
    }],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_pdm_meta_assignments_entity_id",
        column: "entity_id",
        ref_table: "entities",
        ref_column: "id",
        on_delete: OnDelete::NoAction,
    }],
    indexes: &[
        IndexDescriptor { name: "ix_pdm_meta_assignments_entity_id", columns: &["entity_id"], unique: false },
        IndexDescriptor {
            name: "ix_pdm_meta_assignments_codigo",
            columns: &["codigo_indicador_producto"],
            unique: false,
        },
    ],
};

pub static PDM_AVANCES: TableDescriptor = TableDescriptor {
    name: "pdm_avances",
    columns: &[
        Col::id(),
        Col::new("entity_id", T::Integer).not_null(),
        Col::new("codigo_indicador_producto", T::Varchar(128)).not_null(),
        Col::new("anio", T::Integer).not_null(),
        Col::new("valor_ejecutado", T::Float).not_null().default(D::Float(0.0)),
        Col::new("comentario", T::Varchar(512)),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp).default(D::CurrentTimestamp),
    ],
    uniques: &[UniqueConstraint {
        name: "uq_avance_entity_codigo_anio",
        columns: &["entity_id", "codigo_indicador_producto", "anio"],
    }],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_pdm_avances_entity_id",
        column: "entity_id",
        ref_table: "entities",
        ref_column: "id",
        on_delete: OnDelete::NoAction,
    }],
    indexes: &[
        IndexDescriptor { name: "ix_pdm_avances_entity_id", columns: &["entity_id"], unique: false },
        IndexDescriptor { name: "ix_pdm_avances_codigo", columns: &["codigo_indicador_producto"], unique: false },
    ],
};

pub static PDM_ACTIVIDADES: TableDescriptor = TableDescriptor {
    name: "pdm_actividades",
    columns: &[
        Col::id(),
        Col::new("entity_id", T::Integer).not_null(),
        Col::new("codigo_indicador_producto", T::Varchar(128)).not_null(),
        Col::new("nombre", T::Varchar(512)).not_null(),
        Col::new("descripcion", T::Varchar(1024)),
        Col::new("responsable", T::Varchar(256)),
        Col::new("fecha_inicio", T::Timestamp),
        Col::new("fecha_fin", T::Timestamp),
        Col::new("porcentaje_avance", T::Float).not_null().default(D::Float(0.0)),
        Col::new("estado", T::Varchar(64)).not_null().default(D::Text("pendiente")),
        Col::new("anio", T::Integer),
        Col::new("meta_ejecutar", T::Float).not_null().default(D::Float(0.0)),
        Col::new("valor_ejecutado", T::Float).not_null().default(D::Float(0.0)),
        Col::new("created_at", T::Timestamp).default(D::CurrentTimestamp),
        Col::new("updated_at", T::Timestamp).default(D::CurrentTimestamp),
    ],
    uniques: &[UniqueConstraint {
        name: "uq_actividad_entity_codigo_nombre",
        columns: &["entity_id", "codigo_indicador_producto", "nombre"],
    }],
    foreign_keys: &[ForeignKeyConstraint {
        name: "fk_pdm_actividades_entity_id",
        column: "entity_id",
        ref_table: "entities",
        ref_column: "id",
        on_delete: OnDelete::NoAction,
    }],
    indexes: &[
        IndexDescriptor { name: "ix_pdm_actividades_entity_id", columns: &["entity_id"], unique: false },
        IndexDescriptor {
            name: "ix_pdm_actividades_codigo",
            columns: &["codigo_indicador_producto"],
            unique: false,
        },
    ],
};

/// Every table, parents before children
pub static TABLES: &[&TableDescriptor] = &[
    &ENTITIES,
    &USERS,
    &PQRS,
    &PLANES_INSTITUCIONALES,
    &METAS,
    &PDM_META_ASSIGNMENTS,
    &PDM_AVANCES,
    &PDM_ACTIVIDADES,
];

/// Look up a canonical table by name
pub fn table(name: &str) -> Option<&'static TableDescriptor> {
    TABLES.iter().copied().find(|t| t.name == name)
}
