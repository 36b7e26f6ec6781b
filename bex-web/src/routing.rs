//! 路由约定
//!
//! 控制器中的每个路由键都按约定解析为 HTTP 方法和路径：
//!
//! | 路由键      | 方法     | 路径              |
//! |-------------|----------|-------------------|
//! | `create`    | `post`   | `{resource}`      |
//! | `list`      | `get`    | `{resource}`      |
//! | `view`      | `get`    | `{resource}/:id`  |
//! | `update`    | `put`    | `{resource}/:id`  |
//! | `remove`    | `delete` | `{resource}/:id`  |
//!
//! 其它路由键本身就是模板，形如 `"VERB /path"` 或 `"/path"`（默认 GET），
//! 其中第一个 `&` 会被替换为控制器名的 kebab-case 形式。

use bex_core::naming::to_kebab_case;

use crate::error::WebError;

/// 资源名占位符
pub const RESOURCE_PLACEHOLDER: &str = "&";

/// CRUD 路由键及其模板
pub const CRUD_ROUTES: [(&str, &str); 5] = [
    ("create", "post &"),
    ("list", "get &"),
    ("view", "get &/:id"),
    ("update", "put &/:id"),
    ("remove", "delete &/:id"),
];

/// 路由信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteInfo {
    /// 小写的 HTTP 方法
    pub method: String,
    /// 路径，原样保留模板中的写法
    pub path: String,
}

impl std::fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method.to_uppercase(), self.path)
    }
}

/// CRUD 路由键对应的模板
pub fn crud_template(route_key: &str) -> Option<&'static str> {
    CRUD_ROUTES
        .iter()
        .find(|(key, _)| *key == route_key)
        .map(|(_, template)| *template)
}

/// 解析路由键
///
/// # 示例
///
/// ```
/// use bex_web::routing::parse_route;
///
/// let route = parse_route("myBlog", "POST &/:id/publish").unwrap();
/// assert_eq!(route.method, "post");
/// assert_eq!(route.path, "my-blog/:id/publish");
///
/// let route = parse_route("myBlog", "view").unwrap();
/// assert_eq!(route.method, "get");
/// assert_eq!(route.path, "my-blog/:id");
/// ```
pub fn parse_route(controller_name: &str, route_key: &str) -> Result<RouteInfo, WebError> {
    let template = crud_template(route_key).unwrap_or(route_key);
    let route = template.replacen(RESOURCE_PLACEHOLDER, &to_kebab_case(controller_name), 1);

    let parts: Vec<&str> = route.split(' ').collect();
    match parts.as_slice() {
        [path] if !path.is_empty() => Ok(RouteInfo {
            method: "get".to_string(),
            path: path.to_string(),
        }),
        [method, path] => Ok(RouteInfo {
            method: method.to_lowercase(),
            path: path.to_string(),
        }),
        _ => Err(WebError::RouteParse { template: route }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: &str, path: &str) -> RouteInfo {
        RouteInfo {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_crud_routes() {
        assert_eq!(parse_route("my-controller", "create").unwrap(), route("post", "my-controller"));
        assert_eq!(parse_route("my-controller", "list").unwrap(), route("get", "my-controller"));
        assert_eq!(parse_route("my-controller", "view").unwrap(), route("get", "my-controller/:id"));
        assert_eq!(parse_route("my-controller", "update").unwrap(), route("put", "my-controller/:id"));
        assert_eq!(
            parse_route("my-controller", "remove").unwrap(),
            route("delete", "my-controller/:id")
        );
    }

    #[test]
    fn test_crud_routes_from_camel_case_name() {
        let cases = [
            ("create", "post", "my-controller-2"),
            ("list", "get", "my-controller-2"),
            ("view", "get", "my-controller-2/:id"),
            ("update", "put", "my-controller-2/:id"),
            ("remove", "delete", "my-controller-2/:id"),
        ];

        for (alias, method, path) in cases {
            assert_eq!(parse_route("myController2", alias).unwrap(), route(method, path));
        }
        assert_eq!(parse_route("myBlog", "view").unwrap(), route("get", "my-blog/:id"));
    }

    #[test]
    fn test_explicit_route() {
        assert_eq!(
            parse_route("my-controller-2", "patch /my-entity/:id").unwrap(),
            route("patch", "/my-entity/:id")
        );
    }

    #[test]
    fn test_explicit_route_with_resource_name() {
        assert_eq!(
            parse_route("my-controller-2", "head /&/:id").unwrap(),
            route("head", "/my-controller-2/:id")
        );
    }

    #[test]
    fn test_verb_is_lowercased() {
        assert_eq!(
            parse_route("my-controller-2", "DELETE /my-stuff/:id").unwrap(),
            route("delete", "/my-stuff/:id")
        );
    }

    #[test]
    fn test_controller_name_in_kebab_case() {
        assert_eq!(
            parse_route("myController2", "GET &/:id").unwrap(),
            route("get", "my-controller-2/:id")
        );
    }

    #[test]
    fn test_path_only_defaults_to_get() {
        assert_eq!(parse_route("blog", "/about").unwrap(), route("get", "/about"));
    }

    #[test]
    fn test_only_first_placeholder_is_replaced() {
        assert_eq!(
            parse_route("tag", "get &/&").unwrap(),
            route("get", "tag/&")
        );
    }

    #[test]
    fn test_unparseable_routes() {
        let err = parse_route("blog", "get /a extra").unwrap_err();
        assert_eq!(err.to_string(), "Can not parse route \"get /a extra\"");

        assert!(parse_route("blog", "").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(route("get", "my-blog/:id").to_string(), "GET my-blog/:id");
    }
}
