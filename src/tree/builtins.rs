// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Built-in modules

use super::node::{NodeKind, Rgba};
use crate::ast::{Arguments, Context, Value};
use crate::geometry::{fragments, Primitive};
use log::warn;
use nalgebra::{Matrix3, Matrix4, Rotation3, Unit, Vector2, Vector3};

/// Node kind for a built-in module call, `None` if `name` is not built in
pub fn node_kind(name: &str, args: &Arguments, ctx: &Context) -> Option<NodeKind> {
    let kind = match name {
        "cube" => NodeKind::Primitive(cube(args)),
        "sphere" => NodeKind::Primitive(sphere(args, ctx)),
        "cylinder" => NodeKind::Primitive(cylinder(args, ctx)),
        "square" => NodeKind::Primitive(square(args)),
        "circle" => NodeKind::Primitive(circle(args, ctx)),
        "union" => NodeKind::Union,
        "difference" => NodeKind::Difference,
        "intersection" => NodeKind::Intersection,
        "group" => NodeKind::Group,
        "translate" => NodeKind::Transform(translate(args)),
        "rotate" => NodeKind::Transform(rotate(args)),
        "scale" => NodeKind::Transform(scale(args)),
        "mirror" => NodeKind::Transform(mirror(args)),
        "multmatrix" => NodeKind::Transform(multmatrix(args)),
        "color" => NodeKind::Color(color(args)),
        _ => return None,
    };
    Some(kind)
}

/// `$fn`, `$fs`, `$fa`: call arguments first, then the scope
fn fragment_settings(args: &Arguments, ctx: &Context) -> (f64, f64, f64) {
    let setting = |name: &str, default: f64| {
        args.number(name, None)
            .or_else(|| ctx.variable(name).as_number())
            .unwrap_or(default)
    };
    (setting("$fn", 0.0), setting("$fs", 2.0), setting("$fa", 12.0))
}

fn segments(r: f64, args: &Arguments, ctx: &Context) -> u32 {
    let (fn_, fs, fa) = fragment_settings(args, ctx);
    fragments(r, fn_, fs, fa)
}

/// Radius from `r_name` or half of `d_name`
fn radius(args: &Arguments, r_name: &str, d_name: &str, position: Option<usize>) -> Option<f64> {
    args.number(d_name, None)
        .map(|d| d / 2.0)
        .or_else(|| args.number(r_name, position))
}

fn cube(args: &Arguments) -> Primitive {
    let size = match args.get("size", Some(0)) {
        Some(Value::Number(n)) => Vector3::new(*n, *n, *n),
        Some(v) => v.as_vec3(0.0).unwrap_or_else(|| {
            warn!("Unable to convert cube(size = {}) to a vector", v);
            Vector3::new(1.0, 1.0, 1.0)
        }),
        None => Vector3::new(1.0, 1.0, 1.0),
    };
    Primitive::cube(size, args.flag("center", Some(1)))
}

fn sphere(args: &Arguments, ctx: &Context) -> Primitive {
    let r = radius(args, "r", "d", Some(0)).unwrap_or(1.0);
    Primitive::sphere(r, segments(r, args, ctx))
}

fn cylinder(args: &Arguments, ctx: &Context) -> Primitive {
    let h = args.number("h", Some(0)).unwrap_or(1.0);
    let r = radius(args, "r", "d", None).unwrap_or(1.0);
    let r1 = radius(args, "r1", "d1", Some(1)).unwrap_or(r);
    let r2 = radius(args, "r2", "d2", Some(2)).unwrap_or(r);
    let center = args.flag("center", Some(3));
    Primitive::cylinder(h, r1, r2, center, segments(r1.max(r2), args, ctx))
}

fn square(args: &Arguments) -> Primitive {
    let size = match args.get("size", Some(0)) {
        Some(Value::Number(n)) => Vector2::new(*n, *n),
        Some(v) => v.as_vec2().unwrap_or_else(|| Vector2::new(1.0, 1.0)),
        None => Vector2::new(1.0, 1.0),
    };
    Primitive::square(size, args.flag("center", Some(1)))
}

fn circle(args: &Arguments, ctx: &Context) -> Primitive {
    let r = radius(args, "r", "d", Some(0)).unwrap_or(1.0);
    Primitive::circle(r, segments(r, args, ctx))
}

fn translate(args: &Arguments) -> Matrix4<f64> {
    let v = args
        .get("v", Some(0))
        .and_then(|v| v.as_vec3(0.0))
        .unwrap_or_else(Vector3::zeros);
    Matrix4::new_translation(&v)
}

/// `rotate([x, y, z])` applies x, then y, then z; `rotate(a, v)` is an
/// axis-angle rotation, defaulting to the z axis
fn rotate(args: &Arguments) -> Matrix4<f64> {
    match args.get("a", Some(0)) {
        Some(Value::Vector(_)) => {
            let angles = args
                .get("a", Some(0))
                .and_then(|a| a.as_vec3(0.0))
                .unwrap_or_else(Vector3::zeros);
            let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), angles.x.to_radians());
            let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), angles.y.to_radians());
            let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), angles.z.to_radians());
            (rz * ry * rx).to_homogeneous()
        }
        Some(Value::Number(a)) => {
            let axis = args
                .get("v", Some(1))
                .and_then(|v| v.as_vec3(0.0))
                .filter(|v| v.norm() > 0.0)
                .map(Unit::new_normalize)
                .unwrap_or_else(Vector3::z_axis);
            Rotation3::from_axis_angle(&axis, a.to_radians()).to_homogeneous()
        }
        _ => Matrix4::identity(),
    }
}

fn scale(args: &Arguments) -> Matrix4<f64> {
    let v = match args.get("v", Some(0)) {
        Some(Value::Number(n)) => Vector3::new(*n, *n, *n),
        Some(v) => v.as_vec3(1.0).unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0)),
        None => Vector3::new(1.0, 1.0, 1.0),
    };
    Matrix4::new_nonuniform_scaling(&v)
}

/// Reflection across the plane through the origin with normal `v`
fn mirror(args: &Arguments) -> Matrix4<f64> {
    let normal = args
        .get("v", Some(0))
        .and_then(|v| v.as_vec3(0.0))
        .filter(|v| v.norm() > 0.0)
        .map(|v| v.normalize());
    match normal {
        Some(n) => (Matrix3::identity() - 2.0 * n * n.transpose()).to_homogeneous(),
        None => Matrix4::identity(),
    }
}

fn multmatrix(args: &Arguments) -> Matrix4<f64> {
    args.get("m", Some(0))
        .and_then(Value::as_matrix)
        .unwrap_or_else(Matrix4::identity)
}

fn color(args: &Arguments) -> Rgba {
    let alpha = args.number("alpha", Some(1));
    let base = match args.get("c", Some(0)) {
        Some(Value::Str(name)) => named_color(name).or_else(|| Rgba::from_hex(name)),
        Some(v) => v.as_numbers().and_then(|c| match c.as_slice() {
            [r, g, b] => Some(Rgba::new(*r as f32, *g as f32, *b as f32, 1.0)),
            [r, g, b, a] => Some(Rgba::new(*r as f32, *g as f32, *b as f32, *a as f32)),
            _ => None,
        }),
        None => None,
    };
    let base = base.unwrap_or_else(|| {
        warn!("Unable to parse color, using default");
        DEFAULT_COLOR
    });
    match alpha {
        Some(a) => base.with_alpha(a as f32),
        None => base,
    }
}

const DEFAULT_COLOR: Rgba = Rgba::new(-1.0, -1.0, -1.0, 1.0);

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("orange", [255, 165, 0]),
    ("purple", [128, 0, 128]),
    ("pink", [255, 192, 203]),
    ("brown", [165, 42, 42]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("silver", [192, 192, 192]),
    ("gold", [255, 215, 0]),
    ("navy", [0, 0, 128]),
    ("teal", [0, 128, 128]),
    ("olive", [128, 128, 0]),
    ("maroon", [128, 0, 0]),
    ("steelblue", [70, 130, 180]),
    ("tomato", [255, 99, 71]),
    ("violet", [238, 130, 238]),
];

/// CSS color by case-insensitive name
pub fn named_color(name: &str) -> Option<Rgba> {
    let name = name.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [r, g, b])| Rgba::new(*r as f32 / 255.0, *g as f32 / 255.0, *b as f32 / 255.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn positional(values: Vec<Value>) -> Arguments {
        Arguments {
            positional: values,
            named: Vec::new(),
        }
    }

    fn named(pairs: &[(&str, Value)]) -> Arguments {
        Arguments {
            positional: Vec::new(),
            named: pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect(),
        }
    }

    fn vec3(x: f64, y: f64, z: f64) -> Value {
        Value::Vector(vec![x.into(), y.into(), z.into()])
    }

    #[test]
    fn test_cube_scalar_and_vector_size() {
        let ctx = Context::global();
        let kind = node_kind("cube", &positional(vec![Value::Number(2.0)]), &ctx).unwrap();
        assert_eq!(
            kind.describe(),
            "cube(size = [2, 2, 2], center = false)"
        );
        let kind = node_kind("cube", &named(&[("size", vec3(1.0, 2.0, 3.0)), ("center", true.into())]), &ctx).unwrap();
        assert_eq!(kind.describe(), "cube(size = [1, 2, 3], center = true)");
    }

    #[test]
    fn test_fragments_follow_scope_and_arguments() {
        let mut ctx = Context::global();
        let sphere = node_kind("sphere", &named(&[("r", 10.0.into())]), &ctx).unwrap();
        // min(360 / 12, 2 * PI * 10 / 2) = 30
        assert_eq!(sphere.describe(), "sphere($fn = 30, r = 10)");

        ctx.set_variable("$fn", Value::Number(8.0));
        let sphere = node_kind("sphere", &named(&[("d", 4.0.into())]), &ctx).unwrap();
        assert_eq!(sphere.describe(), "sphere($fn = 8, r = 2)");

        let circle = node_kind("circle", &named(&[("r", 1.0.into()), ("$fn", 6.0.into())]), &ctx).unwrap();
        assert_eq!(circle.describe(), "circle($fn = 6, r = 1)");
    }

    #[test]
    fn test_cylinder_radii() {
        let ctx = Context::global();
        let args = named(&[("h", 5.0.into()), ("r1", 2.0.into()), ("d2", 2.0.into()), ("$fn", 12.0.into())]);
        let kind = node_kind("cylinder", &args, &ctx).unwrap();
        assert_eq!(
            kind.describe(),
            "cylinder($fn = 12, h = 5, r1 = 2, r2 = 1, center = false)"
        );
    }

    #[test]
    fn test_rotate_order_is_x_then_y_then_z() {
        let m = rotate(&positional(vec![vec3(90.0, 0.0, 90.0)]));
        let p = m.transform_point(&Point3::new(0.0, 1.0, 0.0));
        // x rotation takes +y to +z, z rotation leaves it there
        assert_relative_eq!(p, Point3::new(0.0, 0.0, 1.0), epsilon = 1e-9);

        let m = rotate(&positional(vec![Value::Number(90.0)]));
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_mirror_reflects_across_plane() {
        let m = mirror(&positional(vec![vec3(1.0, 0.0, 0.0)]));
        let p = m.transform_point(&Point3::new(3.0, 1.0, 2.0));
        assert_relative_eq!(p, Point3::new(-3.0, 1.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_colors() {
        assert_eq!(
            color(&positional(vec![Value::Str("Red".into()), Value::Number(0.5)])),
            Rgba::new(1.0, 0.0, 0.0, 0.5)
        );
        assert_eq!(
            color(&positional(vec![vec3(0.0, 0.0, 1.0)])),
            Rgba::new(0.0, 0.0, 1.0, 1.0)
        );
        assert_eq!(color(&positional(vec![Value::Str("#00ff00".into())])).g, 1.0);
    }

    #[test]
    fn test_unknown_module() {
        assert!(node_kind("polyhedron_x", &Arguments::default(), &Context::global()).is_none());
    }
}
