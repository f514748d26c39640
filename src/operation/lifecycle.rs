//! Operations that move the event through its lifecycle.

use super::Operation;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::param::Template;
use tracing::debug;

fn template_declared_names(template: &Template) -> Vec<String> {
    template
        .declared_names()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Forward the request to another resource inside the application.
#[derive(Debug, Clone)]
pub struct Forward {
    target: Template,
}

impl Forward {
    pub fn to(target: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            target: Template::parse(target)?,
        })
    }
}

impl Operation for Forward {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        let target = self.target.build(event.attributes())?;
        match event.as_http_mut() {
            Some(http) => {
                debug!(target = %target, "Forwarding");
                http.forward(target)
            }
            None => Ok(()),
        }
    }

    fn declared_names(&self) -> Vec<String> {
        template_declared_names(&self.target)
    }
}

/// Include another resource in the response.
#[derive(Debug, Clone)]
pub struct Include {
    target: Template,
}

impl Include {
    pub fn resource(target: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            target: Template::parse(target)?,
        })
    }
}

impl Operation for Include {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        let target = self.target.build(event.attributes())?;
        match event.as_http_mut() {
            Some(http) => http.include(target),
            None => Ok(()),
        }
    }

    fn declared_names(&self) -> Vec<String> {
        template_declared_names(&self.target)
    }
}

/// Send the client to another location.
///
/// Locations starting with a single `/` are prefixed with the request's
/// context path. The event is marked handled.
#[derive(Debug, Clone)]
pub struct Redirect {
    location: Template,
    permanent: bool,
}

impl Redirect {
    /// `302 Found`
    pub fn temporary(location: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            location: Template::parse(location)?,
            permanent: false,
        })
    }

    /// `301 Moved Permanently`
    pub fn permanent(location: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            location: Template::parse(location)?,
            permanent: true,
        })
    }

    pub fn status(&self) -> u16 {
        if self.permanent {
            301
        } else {
            302
        }
    }
}

impl Operation for Redirect {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        let built = self.location.build(event.attributes())?;
        let Some(http) = event.as_http_mut() else {
            return Ok(());
        };

        let location = if built.starts_with('/') && !built.starts_with("//") {
            format!("{}{}", http.request().context_path, built)
        } else {
            built
        };

        http.handled()?;
        debug!(location = %location, status = self.status(), "Redirecting");
        let response = http.response_mut();
        response.set_status(self.status());
        response.set_header("Location", location);
        Ok(())
    }

    fn declared_names(&self) -> Vec<String> {
        template_declared_names(&self.location)
    }
}

/// Lifecycle transitions without a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Abort,
    Proceed,
    Handled,
}

impl Lifecycle {
    pub fn abort() -> Self {
        Self::Abort
    }

    pub fn proceed() -> Self {
        Self::Proceed
    }

    pub fn handled() -> Self {
        Self::Handled
    }
}

impl Operation for Lifecycle {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        let Some(http) = event.as_http_mut() else {
            return Ok(());
        };
        match self {
            Self::Abort => http.abort(),
            Self::Proceed => http.proceed(),
            Self::Handled => http.handled(),
        }
    }
}
