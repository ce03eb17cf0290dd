//! 工具注册表
//!
//! 启动时由各动作的参数结构（JSON Schema）生成 ToolSchema：名称、描述、必填 / 可选参数及其类型。
//! 构造后只读，被意图识别与执行器共享。

use schemars::schema::{InstanceType, RootSchema, Schema, SingleOrVec};
use serde::Serialize;
use serde_json::Value;

use crate::tools::Action;

/// 参数的值类型（用于参数强制转换）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// 任意 JSON（文本或结构化）
    Any,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(skip)]
    pub action: Action,
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    #[serde(rename = "parameters")]
    pub params: Vec<ParamSpec>,
}

fn kind_of(schema: &Schema) -> ParamKind {
    let Schema::Object(obj) = schema else {
        return ParamKind::Any;
    };
    let types: Vec<InstanceType> = match &obj.instance_type {
        Some(SingleOrVec::Single(t)) => vec![**t],
        Some(SingleOrVec::Vec(ts)) => ts.clone(),
        None => return ParamKind::Any,
    };
    match types.into_iter().find(|t| *t != InstanceType::Null) {
        Some(InstanceType::String) => ParamKind::String,
        Some(InstanceType::Integer) => ParamKind::Integer,
        Some(InstanceType::Number) => ParamKind::Number,
        Some(InstanceType::Boolean) => ParamKind::Boolean,
        _ => ParamKind::Any,
    }
}

fn description_of(schema: &Schema) -> Option<String> {
    match schema {
        Schema::Object(obj) => obj.metadata.as_ref().and_then(|m| m.description.clone()),
        Schema::Bool(_) => None,
    }
}

impl ToolSchema {
    pub fn from_root(action: Action, root: &RootSchema) -> Self {
        let description = root
            .schema
            .metadata
            .as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_default();
        let mut params = Vec::new();
        if let Some(obj) = root.schema.object.as_ref() {
            for (name, prop) in &obj.properties {
                params.push(ParamSpec {
                    name: name.clone(),
                    kind: kind_of(prop),
                    required: obj.required.contains(name),
                    description: description_of(prop),
                });
            }
        }
        let required_params = params.iter().filter(|p| p.required).map(|p| p.name.clone()).collect();
        let optional_params = params.iter().filter(|p| !p.required).map(|p| p.name.clone()).collect();
        Self {
            action,
            name: action.name().to_string(),
            description,
            required_params,
            optional_params,
            params,
        }
    }

    pub fn declares(&self, param: &str) -> bool {
        self.params.iter().any(|p| p.name == param)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    fn format_for_prompt(&self) -> String {
        let render = |names: &[String]| -> String {
            if names.is_empty() {
                return "(none)".to_string();
            }
            names
                .iter()
                .map(|n| match self.param(n).and_then(|p| p.description.as_deref()) {
                    Some(d) => format!("{n} ({d})"),
                    None => n.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "- {}: {}\n  required: {}\n  optional: {}",
            self.name,
            self.description,
            render(&self.required_params),
            render(&self.optional_params)
        )
    }
}

/// 按 `Action::ALL` 顺序保存全部工具 schema
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    schemas: Vec<ToolSchema>,
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        let schemas = Action::ALL
            .iter()
            .map(|a| ToolSchema::from_root(*a, &a.parameter_schema()))
            .collect();
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn schema_of(&self, action: Action) -> Option<&ToolSchema> {
        self.schemas.iter().find(|s| s.action == action)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.schemas.iter()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.schemas.iter().map(|s| s.name.clone()).collect()
    }

    /// 渲染工具目录，原样嵌入意图识别 prompt
    pub fn format_for_prompt(&self) -> String {
        self.schemas
            .iter()
            .map(ToolSchema::format_for_prompt)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `GET /tools` 的响应体
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "tools": self.schemas })
    }
}
