// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Planar outlines produced by 2D primitives

use super::BoundingBox;
use nalgebra::{Matrix4, Point2, Point3};
use serde::{Deserialize, Serialize};

/// A set of closed contours in the XY plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline2d {
    pub contours: Vec<Vec<Point2<f64>>>,
}

impl Outline2d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contour(&mut self, contour: Vec<Point2<f64>>) {
        if contour.len() >= 3 {
            self.contours.push(contour);
        }
    }

    pub fn contour_count(&self) -> usize {
        self.contours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.contours.iter().map(Vec::len).sum()
    }

    pub fn merge(&mut self, other: &Outline2d) {
        self.contours.extend(other.contours.iter().cloned());
    }

    /// Apply the XY part of a transform; Z components are dropped
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for contour in &mut self.contours {
            for point in contour.iter_mut() {
                let moved = matrix.transform_point(&Point3::new(point.x, point.y, 0.0));
                *point = Point2::new(moved.x, moved.y);
            }
        }
        if matrix.fixed_view::<2, 2>(0, 0).determinant() < 0.0 {
            for contour in &mut self.contours {
                contour.reverse();
            }
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for point in self.contours.iter().flatten() {
            bbox.expand_to_include(&Point3::new(point.x, point.y, 0.0));
        }
        bbox
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Outline2d>()
            + self.contours.len() * std::mem::size_of::<Vec<Point2<f64>>>()
            + self.point_count() * std::mem::size_of::<Point2<f64>>()
    }
}
